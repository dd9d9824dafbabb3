//! Text-to-speech (TTS) fetching

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

use crate::gemini::GeminiClient;
use crate::gemini::types::{
    Content, GenerateContentRequest, GenerationConfig, PrebuiltVoiceConfig, SpeechConfig,
    VoiceConfig,
};
use crate::{Error, Result};

/// Maximum characters sent for synthesis
pub const MAX_SPEECH_CHARS: usize = 4000;

/// Prebuilt provider voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Voice {
    /// Female voice
    #[default]
    Kore,
    /// Male voice
    Fenrir,
}

impl Voice {
    /// Provider voice identifier
    #[must_use]
    pub const fn provider_name(self) -> &'static str {
        match self {
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kore" | "female" => Ok(Self::Kore),
            "fenrir" | "male" => Ok(Self::Fenrir),
            other => Err(format!(
                "unknown voice '{other}' (expected kore/female or fenrir/male)"
            )),
        }
    }
}

static MARKDOWN_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[#*_`~>]").expect("valid regex")
});
static MARKDOWN_LINKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[.*?\]\(.*?\)").expect("valid regex")
});
static RAW_URLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://\S+").expect("valid regex")
});

/// Strip markdown markers, links and URLs, then cap the length
///
/// Link syntax is removed whole, label included.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    let text = MARKDOWN_MARKERS.replace_all(text, "");
    let text = MARKDOWN_LINKS.replace_all(&text, "");
    let text = RAW_URLS.replace_all(&text, "");
    text.trim().chars().take(MAX_SPEECH_CHARS).collect()
}

/// A validated synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRequest {
    text: String,
    voice: Voice,
}

impl AudioRequest {
    /// Sanitize `text`; `None` when nothing speakable remains
    #[must_use]
    pub fn new(text: &str, voice: Voice) -> Option<Self> {
        let text = sanitize_for_speech(text);
        (!text.is_empty()).then_some(Self { text, voice })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn voice(&self) -> Voice {
        self.voice
    }
}

/// Backend that turns a request into raw 16-bit PCM bytes
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize speech
    ///
    /// # Errors
    ///
    /// Returns error on any provider failure
    async fn synthesize(&self, request: &AudioRequest) -> Result<Vec<u8>>;
}

/// Gemini TTS backend (24 kHz mono PCM, base64 in transit)
pub struct GeminiTts {
    client: GeminiClient,
    model: String,
}

impl GeminiTts {
    #[must_use]
    pub const fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }

    fn build_request(request: &AudioRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(request.text())],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: request.voice().provider_name().to_string(),
                        },
                    },
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SpeechProvider for GeminiTts {
    async fn synthesize(&self, request: &AudioRequest) -> Result<Vec<u8>> {
        let body = Self::build_request(request);
        let response = self.client.generate_content(&self.model, &body).await?;

        let data = response
            .inline_data()
            .ok_or_else(|| Error::Tts("response contained no audio".to_string()))?;

        decode_base64_audio(&data.data)
    }
}

/// Decode a base64 payload, ignoring embedded whitespace
///
/// # Errors
///
/// Returns error if the payload is not valid base64
pub fn decode_base64_audio(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// Fetches speech audio, treating every provider failure as "no audio"
#[derive(Clone)]
pub struct SpeechFetcher {
    provider: Arc<dyn SpeechProvider>,
}

impl SpeechFetcher {
    #[must_use]
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self { provider }
    }

    /// Fetch raw PCM bytes for `text`
    ///
    /// Returns `None` when the text has nothing speakable or the provider fails.
    pub async fn fetch(&self, text: &str, voice: Voice) -> Option<Vec<u8>> {
        let request = AudioRequest::new(text, voice)?;
        self.fetch_request(&request).await
    }

    /// Fetch raw PCM bytes for an already-validated request
    pub async fn fetch_request(&self, request: &AudioRequest) -> Option<Vec<u8>> {
        match self.provider.synthesize(request).await {
            Ok(bytes) => {
                tracing::debug!(
                    bytes = bytes.len(),
                    voice = %request.voice(),
                    "speech synthesized"
                );
                Some(bytes)
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, no audio");
                None
            }
        }
    }
}
