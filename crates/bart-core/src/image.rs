//! Image-generation gateway: Stability AI text-to-image.
//!
//! One request, one 1024x1024 sample, fixed guidance scale. The artifact's
//! base64 payload is wrapped into a self-contained `data:` URI so no separate
//! storage step is needed.
//!
//! API key: `STABILITY_API_KEY`. `STABILITY_API_URL` overrides the endpoint.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STABILITY_API_BASE: &str = "https://api.stability.ai";
const ENGINE_ID: &str = "stable-diffusion-xl-1024-v1-0";
const CFG_SCALE: u32 = 7;
const SAMPLES: u32 = 1;
const IMAGE_SIZE: u32 = 1024;

#[derive(Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    cfg_scale: u32,
    samples: u32,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct GenerationResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    base64: String,
}

/// Gateway seam for image synthesis.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate one image for `prompt`; returns a `data:image/png;base64,...` URI.
    async fn generate(&self, prompt: &str) -> GatewayResult<String>;
}

/// Production image backend against the Stability AI generation API.
#[derive(Debug, Clone)]
pub struct StabilityImage {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl StabilityImage {
    /// Build from environment; fails with `Config` when the key is absent,
    /// without issuing any HTTP call.
    pub fn from_env() -> GatewayResult<Self> {
        let api_key = std::env::var("STABILITY_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                GatewayError::Config("Stability AI API key not configured".to_string())
            })?;
        let base_url =
            std::env::var("STABILITY_API_URL").unwrap_or_else(|_| STABILITY_API_BASE.to_string());
        Self::new(api_key, base_url)
    }

    /// Create with explicit config (tests and non-env wiring).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl ImageBackend for StabilityImage {
    async fn generate(&self, prompt: &str) -> GatewayResult<String> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::Validation("Prompt is required".to_string()));
        }

        let url = format!(
            "{}/v1/generation/{}/text-to-image",
            self.base_url.trim_end_matches('/'),
            ENGINE_ID
        );
        let body = GenerationRequest {
            text_prompts: vec![TextPrompt { text: prompt }],
            cfg_scale: CFG_SCALE,
            samples: SAMPLES,
            width: IMAGE_SIZE,
            height: IMAGE_SIZE,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let detail = res.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, detail });
        }

        let parsed: GenerationResponse = res.json().await?;
        let artifact = parsed
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Transport("response contained no artifacts".to_string()))?;
        Ok(format!("data:image/png;base64,{}", artifact.base64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_a_call() {
        let image = StabilityImage::new("key", "http://127.0.0.1:1").unwrap();
        let err = image.generate("  ").await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
