//! # Bart Voice - capture, speech gateways, playback, session control
//!
//! Push-to-talk voice I/O for the Bart assistant. Recording, transcription,
//! synthesis, and playback are mutually exclusive; a single session owns the
//! input device and the output sink.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Voice Session                            │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────┐  │
//! │  │   Mic In     │→ │ PendingAudio  │→ │  STT Gateway    │  │
//! │  │   (cpal)     │  │  → SealedWAV  │  │  (Deepgram)     │  │
//! │  └──────────────┘  └───────────────┘  └─────────────────┘  │
//! │         ↑                                      ↓            │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────┐  │
//! │  │ Speaker Out  │← │  TTS Gateway  │← │  reply text     │  │
//! │  │   (rodio)    │  │  (Deepgram)   │  └─────────────────┘  │
//! │  └──────────────┘  └───────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod error;
pub mod playback;
pub mod session;
pub mod stt;

pub use audio::{AudioChunk, AudioConfig, CaptureDevice, MicCapture, PendingAudio, SealedAudio};
pub use error::{VoiceError, VoiceResult};
pub use playback::{DeepgramTts, PlaceholderTts, PlaybackSink, SpeakerOutput, TtsBackend};
pub use session::{SessionEvent, SessionState, VoiceSession};
pub use stt::{DeepgramStt, PlaceholderStt, SttBackend};
