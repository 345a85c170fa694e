//! Conversation controller: owns the transcript, sequences one gateway call
//! per user action, and hands assistant replies to the voice layer.
//!
//! The user turn is appended before the outbound call is issued, so the
//! transcript reflects intent immediately; the response (or error) turn is
//! appended only after the call resolves. Auto-speech is dispatched on a
//! channel after the transcript update commits; a speech failure never
//! re-enters or blocks the conversation state.

use crate::chat::ChatBackend;
use crate::image::ImageBackend;
use crate::transcript::{Transcript, Turn};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Greeting seeded as the first assistant turn of every conversation.
const WELCOME: &str = "Welcome to Bart! How can I assist you today?";

/// Shown when the chat gateway fails; the error detail goes to the log only.
const CHAT_ERROR_REPLY: &str = "Sorry, I couldn't process your message. Please try again.";

/// Voice-session seam. The controller only needs push-to-talk semantics; the
/// audio stack behind it lives in bart-voice.
#[async_trait(?Send)]
pub trait VoiceControl {
    fn is_recording(&self) -> bool;

    /// Begin capturing. On device failure the session stays idle.
    fn start_capture(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop capturing and transcribe; empty string when nothing usable was
    /// heard (transcription failures are silent by policy).
    async fn stop_capture(&mut self) -> String;
}

/// Owns the transcript and the transient generating flag. One outbound
/// gateway call chain per user action; turns are appended in completion order.
pub struct ConversationController {
    transcript: Transcript,
    chat: Box<dyn ChatBackend>,
    image: Box<dyn ImageBackend>,
    speech_tx: Option<mpsc::UnboundedSender<String>>,
    generating: bool,
}

impl ConversationController {
    pub fn new(chat: Box<dyn ChatBackend>, image: Box<dyn ImageBackend>) -> Self {
        let mut transcript = Transcript::new();
        transcript.push(Turn::assistant_text(WELCOME));
        Self {
            transcript,
            chat,
            image,
            speech_tx: None,
            generating: false,
        }
    }

    /// Route assistant replies to this channel for auto-speech. Send failures
    /// are ignored; speech never alters the transcript.
    pub fn with_speech_channel(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.speech_tx = Some(tx);
        self
    }

    pub fn transcript(&self) -> &[Turn] {
        self.transcript.turns()
    }

    /// True while an image generation is in flight. Exposed so the rendering
    /// layer can disable input affordances.
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Send a text message: optimistic user turn, chat gateway call, then the
    /// assistant reply (or a generic error turn). Whitespace-only input is a
    /// no-op.
    pub async fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // History is captured before the user turn is appended; the gateway
        // adds the current message itself.
        let history = self.transcript.history();
        self.transcript.push(Turn::user_text(text));

        match self.chat.complete(text, &history).await {
            Ok(reply) => {
                self.transcript.push(Turn::assistant_text(&reply));
                self.autospeak(reply);
            }
            Err(e) => {
                warn!("chat gateway failed: {e}");
                self.transcript.push(Turn::assistant_text(CHAT_ERROR_REPLY));
            }
        }
    }

    /// Generate an image: user turn recording the literal prompt, then an
    /// image turn (or an error turn carrying the gateway's detail). The
    /// generating flag is cleared on every path.
    pub async fn submit_image_prompt(&mut self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }

        self.transcript
            .push(Turn::user_text(format!("Generate image: {prompt}")));
        self.generating = true;
        let result = self.image.generate(prompt).await;
        self.generating = false;

        match result {
            Ok(data_uri) => {
                self.transcript.push(Turn::assistant_image(
                    format!("Generated image for: \"{prompt}\""),
                    data_uri,
                ));
            }
            Err(e) => {
                warn!("image gateway failed: {e}");
                self.transcript.push(Turn::assistant_text(format!(
                    "Sorry, I couldn't generate the image. Error: {e}"
                )));
            }
        }
    }

    /// Push-to-talk: start capturing if idle, otherwise stop and forward the
    /// transcript through [`submit_text`](Self::submit_text). An empty
    /// transcript ends the turn silently.
    pub async fn submit_voice(&mut self, voice: &mut dyn VoiceControl) {
        if voice.is_recording() {
            let transcript = voice.stop_capture().await;
            if transcript.trim().is_empty() {
                return;
            }
            self.submit_text(&transcript).await;
        } else if let Err(e) = voice.start_capture() {
            warn!("voice capture failed to start: {e}");
        }
    }

    /// Append a session feedback line (e.g. "[stopped speaking]").
    pub fn note_status(&mut self, text: &str) {
        self.transcript.push(Turn::status(text));
    }

    fn autospeak(&self, reply: String) {
        if reply.is_empty() {
            return;
        }
        if let Some(tx) = &self.speech_tx {
            let _ = tx.send(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::HistoryTurn;
    use crate::error::{GatewayError, GatewayResult};
    use crate::transcript::{Author, TurnKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeChat {
        reply: GatewayResult<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatBackend for FakeChat {
        async fn complete(&self, _message: &str, _history: &[HistoryTurn]) -> GatewayResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(GatewayError::Upstream { status, detail }) => Err(GatewayError::Upstream {
                    status: *status,
                    detail: detail.clone(),
                }),
                Err(e) => Err(GatewayError::Transport(e.to_string())),
            }
        }
    }

    struct FakeImage {
        result: GatewayResult<String>,
    }

    #[async_trait]
    impl ImageBackend for FakeImage {
        async fn generate(&self, _prompt: &str) -> GatewayResult<String> {
            match &self.result {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(GatewayError::Transport(e.to_string())),
            }
        }
    }

    struct FakeVoice {
        recording: bool,
        transcript: String,
        started: bool,
    }

    #[async_trait(?Send)]
    impl VoiceControl for FakeVoice {
        fn is_recording(&self) -> bool {
            self.recording
        }

        fn start_capture(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.started = true;
            self.recording = true;
            Ok(())
        }

        async fn stop_capture(&mut self) -> String {
            self.recording = false;
            self.transcript.clone()
        }
    }

    fn controller(
        reply: GatewayResult<String>,
        calls: Arc<AtomicUsize>,
    ) -> ConversationController {
        ConversationController::new(
            Box::new(FakeChat { reply, calls }),
            Box::new(FakeImage {
                result: Ok("data:image/png;base64,AAAA".into()),
            }),
        )
    }

    #[tokio::test]
    async fn submit_text_appends_exactly_two_turns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(Ok("hi there".into()), calls.clone());
        let before = convo.transcript().len();

        convo.submit_text("hello").await;

        let turns = convo.transcript();
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before].author, Author::User);
        assert_eq!(turns[before].content, "hello");
        assert_eq!(turns[before + 1].author, Author::Assistant);
        assert_eq!(turns[before + 1].content, "hi there");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(Ok("unused".into()), calls.clone());
        let before = convo.transcript().len();

        convo.submit_text("").await;
        convo.submit_text("   ").await;

        assert_eq!(convo.transcript().len(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gateway_failure_becomes_a_generic_error_turn() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(
            Err(GatewayError::Upstream {
                status: 502,
                detail: "bad gateway".into(),
            }),
            calls.clone(),
        );
        let before = convo.transcript().len();

        convo.submit_text("hello").await;

        let turns = convo.transcript();
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before + 1].content, CHAT_ERROR_REPLY);
        // Provider detail is for the log, never the transcript.
        assert!(!turns[before + 1].content.contains("bad gateway"));
    }

    #[tokio::test]
    async fn replies_are_dispatched_to_the_speech_channel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut convo = controller(Ok("spoken reply".into()), calls).with_speech_channel(tx);

        convo.submit_text("say something").await;

        assert_eq!(rx.try_recv().unwrap(), "spoken reply");
    }

    #[tokio::test]
    async fn a_closed_speech_channel_does_not_disturb_the_transcript() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut convo = controller(Ok("reply".into()), calls).with_speech_channel(tx);
        let before = convo.transcript().len();

        convo.submit_text("hello").await;

        assert_eq!(convo.transcript().len(), before + 2);
        assert_eq!(convo.transcript().last().unwrap().content, "reply");
    }

    #[tokio::test]
    async fn image_success_appends_prompt_and_captioned_image() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(Ok("unused".into()), calls);
        assert!(!convo.is_generating());
        let before = convo.transcript().len();

        convo.submit_image_prompt("a red fox").await;

        let turns = convo.transcript();
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before].content, "Generate image: a red fox");
        assert_eq!(turns[before + 1].kind, TurnKind::Image);
        assert_eq!(turns[before + 1].content, "Generated image for: \"a red fox\"");
        assert!(turns[before + 1].image_ref.is_some());
        assert!(!convo.is_generating());
    }

    #[tokio::test]
    async fn image_failure_clears_the_flag_and_carries_detail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = ConversationController::new(
            Box::new(FakeChat {
                reply: Ok("unused".into()),
                calls,
            }),
            Box::new(FakeImage {
                result: Err(GatewayError::Transport("connection refused".into())),
            }),
        );
        let before = convo.transcript().len();

        convo.submit_image_prompt("a red fox").await;

        let turns = convo.transcript();
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before + 1].kind, TurnKind::Text);
        assert!(turns[before + 1].content.starts_with("Sorry, I couldn't generate the image."));
        assert!(turns[before + 1].content.contains("connection refused"));
        assert!(!convo.is_generating());
    }

    #[tokio::test]
    async fn voice_round_trip_goes_through_submit_text() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(Ok("nice to meet you".into()), calls.clone());
        let mut voice = FakeVoice {
            recording: false,
            transcript: "hello world".into(),
            started: false,
        };
        let before = convo.transcript().len();

        // First press starts capture; nothing is appended.
        convo.submit_voice(&mut voice).await;
        assert!(voice.started);
        assert_eq!(convo.transcript().len(), before);

        // Second press stops, transcribes, and forwards to submit_text.
        convo.submit_voice(&mut voice).await;
        let turns = convo.transcript();
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before].content, "hello world");
        assert_eq!(turns[before].author, Author::User);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_voice_transcript_ends_the_turn_silently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut convo = controller(Ok("unused".into()), calls.clone());
        let mut voice = FakeVoice {
            recording: true,
            transcript: String::new(),
            started: false,
        };
        let before = convo.transcript().len();

        convo.submit_voice(&mut voice).await;

        assert_eq!(convo.transcript().len(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
