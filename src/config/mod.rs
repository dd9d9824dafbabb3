//! Configuration management for OmniSearch

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::search::{LegalMethod, SourceScope};
use crate::voice::Voice;
use crate::{Error, Result};

/// Default Gemini REST endpoint
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for grounded text generation
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";

/// Default model for speech synthesis
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// OmniSearch configuration
#[derive(Debug)]
pub struct Config {
    /// Gemini API key (`GEMINI_API_KEY` or `API_KEY`)
    pub api_key: Option<SecretString>,

    /// Gemini API settings
    pub api: ApiConfig,

    /// Voice settings
    pub voice: VoiceConfig,

    /// Default jurisdiction focus for searches
    pub scope: SourceScope,

    /// Default legal analysis method
    pub method: LegalMethod,

    /// External image generation endpoint, if any
    pub image_url: Option<String>,

    /// Directory holding persisted chat sessions
    pub data_dir: PathBuf,
}

/// Gemini API settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// REST base URL
    pub base_url: String,

    /// Model for grounded generation
    pub text_model: String,

    /// Model for speech synthesis
    pub tts_model: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Voice settings
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceConfig {
    /// Selected synthesis voice
    pub voice: Voice,

    /// Speak each answer as soon as it arrives
    pub auto_speak: bool,
}

/// Default data directory: `~/.local/share/omnisearch` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".omnisearch"),
        |d| d.data_dir().join("omnisearch"),
    )
}

/// Parse a boolean-ish env value ("1", "true", "yes", "on")
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// A missing API key is not an error here; callers that need the
    /// provider use [`Config::require_api_key`].
    ///
    /// # Errors
    ///
    /// Returns error if a configured voice, scope or method is not recognized
    pub fn load() -> Result<Self> {
        Self::from_file(file::load_config_file())
    }

    /// Build configuration from an already-loaded file overlay plus the environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured voice, scope or method is not recognized
    pub fn from_file(fc: file::OmniSearchConfigFile) -> Result<Self> {
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a file overlay and an environment lookup
    ///
    /// Blank values, from either source, count as unset.
    ///
    /// # Errors
    ///
    /// Returns error if a configured voice, scope or method is not recognized
    pub fn from_sources(
        fc: file::OmniSearchConfigFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let defaults = ApiConfig::default();
        let api = ApiConfig {
            base_url: env("OMNISEARCH_API_BASE")
                .or(fc.api.base_url)
                .unwrap_or(defaults.base_url),
            text_model: env("OMNISEARCH_TEXT_MODEL")
                .or(fc.api.text_model)
                .unwrap_or(defaults.text_model),
            tts_model: env("OMNISEARCH_TTS_MODEL")
                .or(fc.api.tts_model)
                .unwrap_or(defaults.tts_model),
            timeout: fc
                .api
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
        };

        let voice = env("OMNISEARCH_VOICE")
            .or(fc.voice.voice)
            .map(|v| v.parse::<Voice>().map_err(Error::Config))
            .transpose()?
            .unwrap_or_default();
        let auto_speak = env("OMNISEARCH_AUTO_SPEAK")
            .and_then(|v| parse_flag(&v))
            .or(fc.voice.auto_speak)
            .unwrap_or(false);

        let scope = fc
            .search
            .scope
            .map(|s| s.parse::<SourceScope>().map_err(Error::Config))
            .transpose()?
            .unwrap_or_default();
        let method = fc
            .search
            .method
            .map(|m| m.parse::<LegalMethod>().map_err(Error::Config))
            .transpose()?
            .unwrap_or_default();

        let image_url = env("OMNISEARCH_IMAGE_URL")
            .or(fc.image_url)
            .filter(|u| !u.trim().is_empty());

        let data_dir = env("OMNISEARCH_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            api_key,
            api,
            voice: VoiceConfig { voice, auto_speak },
            scope,
            method,
            image_url,
            data_dir,
        })
    }

    /// Return the API key or a user-facing configuration error
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key was supplied
    pub fn require_api_key(&self) -> Result<SecretString> {
        self.api_key.clone().ok_or_else(|| {
            Error::Config(
                "API key is missing; set GEMINI_API_KEY (or API_KEY) or add api_key to config.toml"
                    .to_string(),
            )
        })
    }

    /// Path of the persisted session file
    #[must_use]
    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join("sessions.json")
    }
}
