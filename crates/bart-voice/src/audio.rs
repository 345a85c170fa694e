//! Microphone capture and WAV sealing.
//!
//! Samples flow from the cpal callback over an unbounded channel. Stopping
//! the capture drops the stream (releasing the device and closing the
//! channel); the session drains what arrived and seals it into an immutable
//! WAV blob for upload.

use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capture format: single channel at 16 kHz, 30 ms chunks.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per chunk sent to the session (480 = 30 ms at 16 kHz).
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_size: 480,
        }
    }
}

/// One block of samples from the input callback, normalized to -1.0..1.0.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
}

/// In-progress capture buffer. Created when recording starts, sealed when it
/// stops, discarded after transcription completes or fails.
#[derive(Debug)]
pub struct PendingAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PendingAudio {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn push(&mut self, chunk: &AudioChunk) {
        self.samples.extend_from_slice(&chunk.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Finalize into the immutable WAV byte stream the STT gateway uploads.
    pub fn seal(self) -> SealedAudio {
        if self.samples.is_empty() {
            return SealedAudio { wav: Vec::new() };
        }
        SealedAudio {
            wav: pcm_f32_to_wav(&self.samples, self.sample_rate),
        }
    }
}

/// Finalized, immutable audio: a single-channel 16-bit WAV byte stream.
#[derive(Debug, Clone)]
pub struct SealedAudio {
    wav: Vec<u8>,
}

impl SealedAudio {
    /// Wrap an already-encoded WAV body (the HTTP upload path).
    pub fn from_wav(wav: Vec<u8>) -> Self {
        Self { wav }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.wav
    }

    pub fn is_empty(&self) -> bool {
        self.wav.is_empty()
    }
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let num_samples = samples.len() as u32;
    let bytes_per_sample: u16 = 2;
    let num_channels: u16 = 1;
    let data_len = num_samples * bytes_per_sample as u32;
    let file_len = 36 + data_len;

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_len.to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * num_channels as u32 * bytes_per_sample as u32;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = num_channels * bytes_per_sample;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes());
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }
    buf
}

/// Input-device seam for the session controller. The production device is
/// [`MicCapture`]; tests inject fakes.
pub trait CaptureDevice {
    /// Acquire the device and begin streaming chunks. Fails with
    /// `AudioDevice` when no input device is available or permission is
    /// denied; the session stays idle in that case.
    fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<AudioChunk>>;

    /// Stop streaming and release the device. Closes the chunk channel.
    fn stop(&mut self) -> VoiceResult<()>;

    fn sample_rate(&self) -> u32;
}

/// Default-host microphone capture via cpal.
pub struct MicCapture {
    config: AudioConfig,
    stream: Option<Stream>,
}

impl MicCapture {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// List available input devices.
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl CaptureDevice for MicCapture {
    fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<AudioChunk>> {
        if self.stream.is_some() {
            return Err(VoiceError::Capture("capture already running".to_string()));
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("no input device available".to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "acquired input device"
        );

        let stream_config = StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let chunk_size = self.config.chunk_size;
        let mut buffer: Vec<f32> = Vec::with_capacity(chunk_size);
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    buffer.push(sample);
                    if buffer.len() >= chunk_size {
                        let chunk = AudioChunk {
                            samples: std::mem::take(&mut buffer),
                        };
                        if tx.send(chunk).is_err() {
                            return;
                        }
                    }
                }
            },
            move |err| {
                warn!("input stream error: {err}");
            },
            None,
        )?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(rx)
    }

    fn stop(&mut self) -> VoiceResult<()> {
        // Dropping the stream releases the device and closes the channel.
        self.stream.take();
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_config_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.chunk_size, 480);
    }

    #[test]
    fn sealed_wav_has_a_valid_riff_header() {
        let mut pending = PendingAudio::new(16000);
        pending.push(&AudioChunk {
            samples: vec![0.0, 0.5, -0.5, 1.0],
        });
        let sealed = pending.seal();
        let bytes = sealed.as_bytes();

        assert_eq!(bytes.len(), 44 + 4 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");
        // data length field: 4 samples x 2 bytes
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 8);
    }

    #[test]
    fn samples_are_clamped_before_quantization() {
        let mut pending = PendingAudio::new(16000);
        pending.push(&AudioChunk {
            samples: vec![2.0, -2.0],
        });
        let sealed = pending.seal();
        let bytes = sealed.as_bytes();
        let first = i16::from_le_bytes(bytes[44..46].try_into().unwrap());
        let second = i16::from_le_bytes(bytes[46..48].try_into().unwrap());
        assert_eq!(first, 32767);
        assert_eq!(second, -32767);
    }

    #[test]
    fn an_empty_buffer_seals_to_empty_audio() {
        let sealed = PendingAudio::new(16000).seal();
        assert!(sealed.is_empty());
    }
}
