//! Text-to-speech gateway (Deepgram Aura) and speaker playback.
//!
//! The gateway returns the provider's raw audio bytes; the HTTP surface
//! base64-encodes them into a data URI, the console plays them through the
//! rodio sink.

use crate::error::{VoiceError, VoiceResult};
use crate::stt::DEEPGRAM_API_BASE;
use async_trait::async_trait;
use bart_core::{GatewayError, GatewayResult};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::time::Duration;
use tracing::info;

/// Fixed voice model for all synthesis requests.
const TTS_VOICE_MODEL: &str = "aura-asteria-en";

/// Backend that turns text into a self-contained audio payload (WAV bytes).
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize text to audio bytes. Empty output skips playback.
    async fn synthesize(&self, text: &str) -> GatewayResult<Vec<u8>>;
}

/// Placeholder TTS: returns empty audio so nothing plays. Keyless runs stay
/// functional without synthesis.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> GatewayResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Production TTS backend against the Deepgram speak API.
#[derive(Debug, Clone)]
pub struct DeepgramTts {
    base_url: String,
    api_key: String,
    voice_model: String,
    client: reqwest::Client,
}

impl DeepgramTts {
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
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            voice_model: TTS_VOICE_MODEL.to_string(),
            client,
        })
    }
}

#[async_trait]
impl TtsBackend for DeepgramTts {
    async fn synthesize(&self, text: &str) -> GatewayResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(GatewayError::Validation("Text is required".to_string()));
        }

        let url = format!(
            "{}/v1/speak?model={}",
            self.base_url.trim_end_matches('/'),
            self.voice_model
        );
        let body = serde_json::json!({ "text": text });
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let detail = res.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, detail });
        }

        let bytes = res.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Output-device seam for the session controller. The production sink is
/// [`SpeakerOutput`]; tests inject fakes.
pub trait PlaybackSink {
    /// Begin playing the payload; returns once the sink has accepted it.
    fn play(&mut self, bytes: &[u8]) -> VoiceResult<()>;

    /// Halt immediately and clear anything queued. Safe to call when idle.
    fn stop(&mut self);

    /// Whether the sink currently has queued samples.
    fn is_playing(&self) -> bool;
}

/// Default-device speaker output via a rodio sink.
pub struct SpeakerOutput {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl SpeakerOutput {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("speaker output ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }
}

impl PlaybackSink for SpeakerOutput {
    fn play(&mut self, bytes: &[u8]) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let cursor = Cursor::new(bytes.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| VoiceError::Playback(format!("decode failed: {e}")))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.stop();
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}
