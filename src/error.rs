//! Error types for OmniSearch

use thiserror::Error;

/// Result type alias for OmniSearch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in OmniSearch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, invalid value)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Grounded search / text generation error
    #[error("search error: {0}")]
    Search(String),

    /// Provider returned a non-success status
    #[error("provider error {status}: {body}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Image generation hook error
    #[error("image generation error: {0}")]
    ImageGen(String),

    /// Session storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}
