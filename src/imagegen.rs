//! Optional external image generation endpoint

use serde::Deserialize;

use crate::{Error, Result};

/// Phrases that route a prompt to image generation
const IMAGE_KEYWORDS: &[&str] = &["generate image", "draw", "create image", "picture of"];

/// Whether `text` asks for an image
#[must_use]
pub fn is_image_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    IMAGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[derive(Debug, Deserialize)]
struct ImageReply {
    url: Option<String>,
    image: Option<String>,
    output: Option<String>,
}

impl ImageReply {
    fn into_image(self) -> Option<String> {
        self.url.or(self.image).or(self.output)
    }
}

/// Posts `{ "prompt": ... }` to a user-supplied URL
pub struct ImageGenerator {
    client: reqwest::Client,
    url: String,
}

impl ImageGenerator {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Request an image; returns its URL or data payload
    ///
    /// # Errors
    ///
    /// Returns error if the call fails or the reply has no image field
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider { status, body });
        }

        let reply: ImageReply = response.json().await?;
        reply
            .into_image()
            .ok_or_else(|| Error::ImageGen("reply contained no image".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_image_requests() {
        assert!(is_image_request("Please DRAW a lighthouse"));
        assert!(is_image_request("a picture of the Lagos skyline"));
        assert!(!is_image_request("What is the capital of Nigeria?"));
    }

    #[test]
    fn reply_field_precedence() {
        let reply: ImageReply =
            serde_json::from_str(r#"{"image": "b", "output": "c"}"#).unwrap();
        assert_eq!(reply.into_image().as_deref(), Some("b"));

        let empty: ImageReply = serde_json::from_str("{}").unwrap();
        assert!(empty.into_image().is_none());
    }
}
