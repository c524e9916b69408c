use crate::config::VisionConfig;
use anyhow::Context;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VisionError {
    /// Upstream replied with a non-2xx status; the raw body is kept so the
    /// HTTP layer can pass the provider's own error through.
    #[error("vision API returned {status}")]
    Upstream { status: reqwest::StatusCode, body: Vec<u8> },
    #[error("request to vision API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server not configured: set OPENAI_API_KEY or [vision] api_key")]
    MissingApiKey,
}

/// Client for the Responses API. Sends one photo plus the identification
/// prompt, returns the raw response envelope — extraction happens elsewhere.
#[derive(Debug, Clone)]
pub struct VisionClient {
    config: VisionConfig,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            config: config.clone(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn model_name(&self) -> &str { &self.config.model }

    /// Ship the photo to the model, return the envelope bytes verbatim.
    pub async fn identify(
        &self,
        prompt: &str,
        image: &[u8],
        mime: &str,
    ) -> Result<Vec<u8>, VisionError> {
        let api_key = self.config.resolve_api_key().ok_or(VisionError::MissingApiKey)?;
        let body = request_body(&self.config.model, prompt, &data_url(mime, image));

        debug!("POST {} (model {})", self.config.endpoint, self.config.model);
        let resp = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?.to_vec();
        if !status.is_success() {
            return Err(VisionError::Upstream { status, body: bytes });
        }
        Ok(bytes)
    }
}

/// One user turn: the prompt text plus the photo as an inline data URL.
fn request_body(model: &str, prompt: &str, image_url: &str) -> Value {
    json!({
        "model": model,
        "input": [
            {
                "role": "user",
                "content": [
                    {"type": "input_text", "text": prompt},
                    {"type": "input_image", "image_url": image_url}
                ]
            }
        ]
    })
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
    )
}

/// The identification prompt lives in a file so it can be tuned without a
/// rebuild; read fresh on every request.
pub fn load_prompt(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt file {}", path.display()))
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = request_body("gpt-5-mini", "what car is this?", "data:image/jpeg;base64,AAAA");
        assert_eq!(body["model"], "gpt-5-mini");
        let content = &body["input"][0]["content"];
        assert_eq!(content[0]["type"], "input_text");
        assert_eq!(content[0]["text"], "what car is this?");
        assert_eq!(content[1]["type"], "input_image");
        assert_eq!(content[1]["image_url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_data_url_prefix_and_padding() {
        let url = data_url("image/png", &[0, 1, 2]);
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.ends_with("AAEC"));
    }
}
