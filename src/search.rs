//! Search-grounded answers from Gemini

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::chat::GroundingSource;
use crate::gemini::GeminiClient;
use crate::gemini::types::{Content, GenerateContentRequest, GenerationConfig, Part, Tool};
use crate::{Error, Result};

/// Jurisdiction the answer should focus on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceScope {
    #[default]
    Global,
    Nigeria,
}

impl SourceScope {
    fn focus(self) -> &'static str {
        match self {
            Self::Global => "Global/International",
            Self::Nigeria => "Nigeria (Constitution and Laws)",
        }
    }
}

impl fmt::Display for SourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "GLOBAL",
            Self::Nigeria => "NIGERIA",
        })
    }
}

impl FromStr for SourceScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "nigeria" => Ok(Self::Nigeria),
            other => Err(format!("unknown scope '{other}' (expected global or nigeria)")),
        }
    }
}

/// Legal analysis framework applied to the answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LegalMethod {
    #[default]
    None,
    Irac,
    Ipac,
    Crec,
}

impl fmt::Display for LegalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Irac => "IRAC",
            Self::Ipac => "IPAC",
            Self::Crec => "CREC",
        })
    }
}

impl FromStr for LegalMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "general" => Ok(Self::None),
            "irac" => Ok(Self::Irac),
            "ipac" => Ok(Self::Ipac),
            "crec" => Ok(Self::Crec),
            other => Err(format!(
                "unknown method '{other}' (expected none, irac, ipac or crec)"
            )),
        }
    }
}

/// An image attached to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Base64 payload without a `data:` prefix
    pub data: String,
}

impl ImageAttachment {
    /// Parse a `data:<mime>;base64,<payload>` URL or a bare base64 payload
    ///
    /// Bare payloads are assumed to be JPEG.
    #[must_use]
    pub fn from_data_url(value: &str) -> Self {
        value
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .map_or_else(
                || Self {
                    mime_type: "image/jpeg".to_string(),
                    data: value.to_string(),
                },
                |(meta, data)| Self {
                    mime_type: meta.split(';').next().unwrap_or("image/jpeg").to_string(),
                    data: data.to_string(),
                },
            )
    }

    /// Render back to a `data:` URL for storage
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Generated answer with its web citations
#[derive(Debug, Clone, Default)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// System prompt for a scope and method
#[must_use]
pub fn system_instruction(scope: SourceScope, method: LegalMethod) -> String {
    let method_line = if method == LegalMethod::None {
        String::new()
    } else {
        format!("Apply the {method} methodology to your analysis.\n")
    };

    format!(
        "You are OmniSearch AI, a high-intelligence research assistant.\n\
         CRITICAL: For every query, ALWAYS use the 'googleSearch' tool to verify facts and check recent events.\n\
         JURISDICTION FOCUS: {}.\n\
         {method_line}\
         Always provide factual citations and link to sources at the end. Be professional and direct.",
        scope.focus()
    )
}

/// Produces answers for the chat
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Answer `prompt`, optionally with images, citing web sources
    ///
    /// # Errors
    ///
    /// Returns error if no answer could be produced
    async fn answer(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
        method: LegalMethod,
        scope: SourceScope,
    ) -> Result<GroundedAnswer>;
}

/// Grounded text generation backed by Google Search
pub struct GroundedSearch {
    client: GeminiClient,
    model: String,
}

impl GroundedSearch {
    #[must_use]
    pub const fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl AnswerSource for GroundedSearch {
    async fn answer(
        &self,
        prompt: &str,
        images: &[ImageAttachment],
        method: LegalMethod,
        scope: SourceScope,
    ) -> Result<GroundedAnswer> {
        let request = build_request(prompt, images, method, scope);
        let response = self.client.generate_content(&self.model, &request).await?;

        let text = response
            .text()
            .ok_or_else(|| Error::Search("empty response from AI".to_string()))?;

        let sources: Vec<GroundingSource> = response
            .grounding()
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        Some(GroundingSource {
                            title: web
                                .title
                                .clone()
                                .filter(|t| !t.is_empty())
                                .unwrap_or_else(|| "Reference".to_string()),
                            uri: web.uri.clone()?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(chars = text.len(), sources = sources.len(), "grounded answer received");
        Ok(GroundedAnswer { text, sources })
    }
}

fn build_request(
    prompt: &str,
    images: &[ImageAttachment],
    method: LegalMethod,
    scope: SourceScope,
) -> GenerateContentRequest {
    let mut parts = vec![Part::text(prompt)];
    parts.extend(
        images
            .iter()
            .map(|img| Part::inline(img.mime_type.clone(), img.data.clone())),
    );

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        system_instruction: Some(Content::text(system_instruction(scope, method))),
        tools: vec![Tool::google_search()],
        generation_config: Some(GenerationConfig {
            temperature: Some(0.1),
            ..Default::default()
        }),
    }
}
