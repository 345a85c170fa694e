//! Voice session controller: mutually-exclusive capture, transcription,
//! synthesis, and playback.
//!
//! Transitions are a pure function of `(state, event)`; the controller
//! applies effects (device start/stop, gateway calls, sink control) between
//! events. Only one session exists per client, so serializing its own
//! transitions is the only concurrency defense required.

use crate::audio::{AudioChunk, CaptureDevice, PendingAudio};
use crate::error::{VoiceError, VoiceResult};
use crate::playback::{PlaybackSink, TtsBackend};
use crate::stt::SttBackend;
use async_trait::async_trait;
use bart_core::VoiceControl;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The session's single mode. `Transcribing` and `Synthesizing` are the two
/// concrete processing phases; recording, processing, and playback never
/// overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Transcribing,
    Synthesizing,
    Speaking,
}

impl SessionState {
    pub fn is_processing(self) -> bool {
        matches!(self, SessionState::Transcribing | SessionState::Synthesizing)
    }
}

/// Everything that can move the session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    CaptureStarted,
    CaptureFailed,
    CaptureStopped,
    TranscriptReady,
    SpeakRequested,
    AudioReady,
    PlaybackEnded,
    PlaybackErrored,
    StopSpeaking,
}

impl SessionState {
    /// Pure transition table. Pairs outside the table keep the current state;
    /// in particular `StopSpeaking` is an idempotent no-op outside `Speaking`.
    pub fn next(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;
        match (self, event) {
            (Idle, CaptureStarted) => Recording,
            (Idle, CaptureFailed) => Idle,
            (Recording, CaptureStopped) => Transcribing,
            (Transcribing, TranscriptReady) => Idle,
            (Idle, SpeakRequested) => Synthesizing,
            (Synthesizing, AudioReady) => Speaking,
            // Empty synthesis output: playback trivially ends.
            (Synthesizing, PlaybackEnded | PlaybackErrored) => Idle,
            (Speaking, PlaybackEnded | PlaybackErrored | StopSpeaking) => Idle,
            (state, _) => state,
        }
    }
}

/// Owns the input device, the pending capture buffer, and the output sink.
/// Not `Send`: the cpal stream and rodio sink stay pinned to one thread.
pub struct VoiceSession {
    state: SessionState,
    capture: Box<dyn CaptureDevice>,
    chunk_rx: Option<mpsc::UnboundedReceiver<AudioChunk>>,
    pending: Option<PendingAudio>,
    playback: Box<dyn PlaybackSink>,
    stt: Box<dyn SttBackend>,
    tts: Box<dyn TtsBackend>,
}

impl VoiceSession {
    pub fn new(
        capture: Box<dyn CaptureDevice>,
        playback: Box<dyn PlaybackSink>,
        stt: Box<dyn SttBackend>,
        tts: Box<dyn TtsBackend>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            capture,
            chunk_rx: None,
            pending: None,
            playback,
            stt,
            tts,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Speaking
    }

    fn apply(&mut self, event: SessionEvent) {
        let next = self.state.next(event);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?event, "session transition");
        }
        self.state = next;
    }

    /// Acquire the input device and begin buffering. Only legal from `Idle`;
    /// on device failure the state stays `Idle`.
    pub fn start_capture(&mut self) -> VoiceResult<()> {
        if self.state != SessionState::Idle {
            return Err(VoiceError::Busy(format!(
                "cannot record while {:?}",
                self.state
            )));
        }
        match self.capture.start() {
            Ok(rx) => {
                self.chunk_rx = Some(rx);
                self.pending = Some(PendingAudio::new(self.capture.sample_rate()));
                self.apply(SessionEvent::CaptureStarted);
                Ok(())
            }
            Err(e) => {
                self.apply(SessionEvent::CaptureFailed);
                Err(e)
            }
        }
    }

    /// Stop capturing, seal the buffer, and transcribe it. A transcription
    /// failure is silent by policy: the caller gets an empty string and the
    /// detail goes to the log.
    pub async fn stop_capture(&mut self) -> String {
        if self.state != SessionState::Recording {
            return String::new();
        }
        if let Err(e) = self.capture.stop() {
            warn!("capture stop failed: {e}");
        }
        self.apply(SessionEvent::CaptureStopped);

        let sample_rate = self.capture.sample_rate();
        let mut pending = self
            .pending
            .take()
            .unwrap_or_else(|| PendingAudio::new(sample_rate));
        if let Some(mut rx) = self.chunk_rx.take() {
            while let Ok(chunk) = rx.try_recv() {
                pending.push(&chunk);
            }
        }
        let sealed = pending.seal();

        let transcript = if sealed.is_empty() {
            String::new()
        } else {
            match self.stt.transcribe(&sealed).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("transcription failed: {e}");
                    String::new()
                }
            }
        };
        self.apply(SessionEvent::TranscriptReady);
        transcript
    }

    /// Synthesize `text` and start playing it. Only legal from `Idle`.
    pub async fn speak(&mut self, text: &str) -> VoiceResult<()> {
        if self.state != SessionState::Idle {
            return Err(VoiceError::Busy(format!(
                "cannot speak while {:?}",
                self.state
            )));
        }
        self.apply(SessionEvent::SpeakRequested);

        let bytes = match self.tts.synthesize(text).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.apply(SessionEvent::PlaybackErrored);
                return Err(VoiceError::Tts(e.to_string()));
            }
        };
        if bytes.is_empty() {
            self.apply(SessionEvent::PlaybackEnded);
            return Ok(());
        }
        match self.playback.play(&bytes) {
            Ok(()) => {
                self.apply(SessionEvent::AudioReady);
                Ok(())
            }
            Err(e) => {
                self.apply(SessionEvent::PlaybackErrored);
                Err(e)
            }
        }
    }

    /// Halt playback immediately and reset the queue. Idempotent: a no-op in
    /// every state but `Speaking`.
    pub fn stop_speaking(&mut self) {
        if self.state == SessionState::Speaking {
            self.playback.stop();
            info!("playback stopped by caller");
        }
        self.apply(SessionEvent::StopSpeaking);
    }

    /// Fold playback completion back into the state machine. Callers invoke
    /// this each tick; the sink reports drain.
    pub fn poll_playback(&mut self) {
        if self.state == SessionState::Speaking && !self.playback.is_playing() {
            self.apply(SessionEvent::PlaybackEnded);
        }
    }
}

#[async_trait(?Send)]
impl VoiceControl for VoiceSession {
    fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    fn start_capture(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        VoiceSession::start_capture(self).map_err(Into::into)
    }

    async fn stop_capture(&mut self) -> String {
        VoiceSession::stop_capture(self).await
    }
}
