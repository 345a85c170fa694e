//! Speech-to-text gateway (Deepgram prerecorded transcription).
//!
//! The sealed WAV bytes are the request body. A well-formed response with no
//! alternatives yields an empty transcript, not an error.
//!
//! API key: `DEEPGRAM_API_KEY` (shared with the TTS gateway).
//! `DEEPGRAM_API_URL` overrides the endpoint (tests point this at a stub).

use crate::audio::SealedAudio;
use async_trait::async_trait;
use bart_core::{GatewayError, GatewayResult};
use std::time::Duration;

pub(crate) const DEEPGRAM_API_BASE: &str = "https://api.deepgram.com";

/// Backend for converting sealed audio into text. Implemented by
/// [`DeepgramStt`] in production and by fakes in session tests.
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Transcribe one sealed capture; empty string when nothing was recognized.
    async fn transcribe(&self, audio: &SealedAudio) -> GatewayResult<String>;
}

/// Fixed-response backend for tests and keyless runs.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, returned for every transcription; otherwise empty.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait]
impl SttBackend for PlaceholderStt {
    async fn transcribe(&self, _audio: &SealedAudio) -> GatewayResult<String> {
        Ok(self.response.clone().unwrap_or_default())
    }
}

/// Production STT backend against the Deepgram listen API.
#[derive(Debug, Clone)]
pub struct DeepgramStt {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DeepgramStt {
    /// Build from environment; fails with `Config` when the key is absent,
    /// without issuing any HTTP call.
    pub fn from_env() -> GatewayResult<Self> {
        let api_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::Config("Deepgram API key not configured".to_string()))?;
        let base_url =
            std::env::var("DEEPGRAM_API_URL").unwrap_or_else(|_| DEEPGRAM_API_BASE.to_string());
        Self::new(base_url, api_key)
    }

    /// Create with explicit config (tests and non-env wiring).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl SttBackend for DeepgramStt {
    async fn transcribe(&self, audio: &SealedAudio) -> GatewayResult<String> {
        if audio.is_empty() {
            return Err(GatewayError::Validation("Audio file is required".to_string()));
        }

        let url = format!("{}/v1/listen", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.as_bytes().to_vec())
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let detail = res.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, detail });
        }

        let json: serde_json::Value = res.json().await?;
        let transcript = json
            .pointer("/results/channels/0/alternatives/0/transcript")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        Ok(transcript)
    }
}
