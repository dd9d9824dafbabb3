//! OmniSearch - search-grounded AI chat with spoken answers
//!
//! This library provides:
//! - Grounded answers from Gemini with web citations
//! - Chat sessions persisted to a local JSON file
//! - A voice pipeline: TTS fetch, PCM decoding, per-message caching and
//!   single-output playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 CLI / Assistant                      │
//! │   sessions  │  prompts  │  speaking/loading index   │
//! └───────┬──────────────────────────────┬──────────────┘
//!         │                              │
//! ┌───────▼────────┐   ┌─────────────────▼──────────────┐
//! │ GroundedSearch │   │ VoiceCache → PlaybackController │
//! │ ImageGenerator │   │   │                 │           │
//! └───────┬────────┘   │ SpeechFetcher    AudioContext   │
//!         │            │   │ decode_pcm16     (cpal)     │
//!         │            └───┼─────────────────────────────┘
//! ┌───────▼────────────────▼────────────────────────────┐
//! │            Gemini generateContent API                │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod gemini;
pub mod imagegen;
pub mod search;
pub mod voice;

pub use assistant::{Assistant, Settings};
pub use chat::{ChatSession, GroundingSource, Message, Role, SessionStore};
pub use config::Config;
pub use error::{Error, Result};
pub use search::{AnswerSource, GroundedAnswer, GroundedSearch, ImageAttachment, LegalMethod, SourceScope};
pub use voice::{
    AudioBuffer, AudioContext, AudioOutput, PlaybackController, PlaybackHandle, PlaybackOutcome,
    SpeechFetcher, SpeechProvider, Voice, VoiceCache,
};
