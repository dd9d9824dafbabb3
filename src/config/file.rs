//! TOML configuration file loading
//!
//! Supports `~/.config/omnisearch/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct OmniSearchConfigFile {
    /// Gemini API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Gemini API configuration
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchFileConfig,

    /// External image generation endpoint
    #[serde(default)]
    pub image_url: Option<String>,

    /// Directory holding `sessions.json`
    #[serde(default)]
    pub data_dir: Option<String>,
}

/// Gemini API configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL (e.g. `https://generativelanguage.googleapis.com/v1beta`)
    pub base_url: Option<String>,

    /// Model used for grounded text generation
    pub text_model: Option<String>,

    /// Model used for speech synthesis
    pub tts_model: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Voice name or gender ("kore", "fenrir", "female", "male")
    pub voice: Option<String>,

    /// Speak every answer as soon as it arrives
    pub auto_speak: Option<bool>,
}

/// Search defaults
#[derive(Debug, Default, Deserialize)]
pub struct SearchFileConfig {
    /// Jurisdiction focus ("global", "nigeria")
    pub scope: Option<String>,

    /// Legal analysis method ("none", "irac", "ipac", "crec")
    pub method: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `OmniSearchConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> OmniSearchConfigFile {
    config_file_path().map_or_else(OmniSearchConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> OmniSearchConfigFile {
    if !path.exists() {
        return OmniSearchConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                OmniSearchConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            OmniSearchConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omnisearch/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("omnisearch").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: OmniSearchConfigFile = toml::from_str(
            r#"
            api_key = "k"

            [voice]
            voice = "fenrir"
            "#,
        )
        .unwrap();

        assert_eq!(fc.api_key.as_deref(), Some("k"));
        assert_eq!(fc.voice.voice.as_deref(), Some("fenrir"));
        assert!(fc.voice.auto_speak.is_none());
        assert!(fc.api.text_model.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_from(&dir.path().join("absent.toml"));
        assert!(fc.api_key.is_none());
    }

    #[test]
    fn broken_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_key = [unterminated").unwrap();
        let fc = load_from(&path);
        assert!(fc.api_key.is_none());
    }
}
