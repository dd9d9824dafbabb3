//! Voice output pipeline
//!
//! Text flows through the speech fetcher, is decoded from 16-bit PCM,
//! memoized per message and played through the single audio output.

mod cache;
mod output;
mod pcm;
mod playback;
mod tts;

pub use cache::VoiceCache;
pub use output::{AudioContext, AudioOutput, CompletionFn, ContextState};
pub use pcm::{AudioBuffer, PcmFormat, TTS_SAMPLE_RATE, decode_pcm16};
pub use playback::{PlaybackController, PlaybackHandle, PlaybackOutcome};
pub use tts::{
    AudioRequest, GeminiTts, MAX_SPEECH_CHARS, SpeechFetcher, SpeechProvider, Voice,
    decode_base64_audio, sanitize_for_speech,
};
