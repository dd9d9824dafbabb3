//! Minimal Gemini REST client
//!
//! Only `generateContent` is used: grounded text generation and
//! single-shot speech synthesis both go through it.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

pub use types::{GenerateContentRequest, GenerateContentResponse};

/// Shared HTTP client bound to one API key
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Arc<SecretString>,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Create a client for the given base URL
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty or the HTTP client cannot be built
    pub fn new(api_key: SecretString, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("API key is missing".to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_key: Arc::new(api_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint URL for a model
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Call `generateContent` on `model`
    ///
    /// # Errors
    ///
    /// Returns `Error::Provider` on a non-success status, `Error::Http` on
    /// transport or decoding failures
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model);
        tracing::debug!(%url, "calling generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider { status, body });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_key() {
        let err = GeminiClient::new(
            SecretString::from("  ".to_string()),
            "https://example.test/v1beta",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(
            SecretString::from("key".to_string()),
            "https://example.test/v1beta/",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash-preview-tts"),
            "https://example.test/v1beta/models/gemini-2.5-flash-preview-tts:generateContent"
        );
        assert!(!format!("{client:?}").contains("key\""));
    }
}
