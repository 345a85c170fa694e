//! End-to-end voice round-trip: push-to-talk through the conversation
//! controller, with fakes for the devices and the remote gateways.

use async_trait::async_trait;
use bart_core::{
    Author, ChatBackend, ConversationController, GatewayResult, HistoryTurn, ImageBackend,
};
use bart_voice::{
    AudioChunk, CaptureDevice, PlaceholderStt, PlaceholderTts, PlaybackSink, VoiceResult,
    VoiceSession,
};
use tokio::sync::mpsc;

struct EchoChat;

#[async_trait]
impl ChatBackend for EchoChat {
    async fn complete(&self, message: &str, _history: &[HistoryTurn]) -> GatewayResult<String> {
        Ok(format!("you said: {message}"))
    }
}

struct NoImage;

#[async_trait]
impl ImageBackend for NoImage {
    async fn generate(&self, _prompt: &str) -> GatewayResult<String> {
        unreachable!("image gateway is not part of the voice flow")
    }
}

struct OneChunkCapture;

impl CaptureDevice for OneChunkCapture {
    fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<AudioChunk>> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AudioChunk {
            samples: vec![0.2; 480],
        })
        .unwrap();
        Ok(rx)
    }

    fn stop(&mut self) -> VoiceResult<()> {
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

struct SilentSink;

impl PlaybackSink for SilentSink {
    fn play(&mut self, _bytes: &[u8]) -> VoiceResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn push_to_talk_round_trip_appends_two_turns() {
    let mut convo = ConversationController::new(Box::new(EchoChat), Box::new(NoImage));
    let mut session = VoiceSession::new(
        Box::new(OneChunkCapture),
        Box::new(SilentSink),
        Box::new(PlaceholderStt::with_response("hello world")),
        Box::new(PlaceholderTts),
    );
    let before = convo.transcript().len();

    // Press once to record, once more to stop and submit.
    convo.submit_voice(&mut session).await;
    assert!(session.is_recording());
    assert_eq!(convo.transcript().len(), before);

    convo.submit_voice(&mut session).await;
    let turns = convo.transcript();
    assert_eq!(turns.len(), before + 2);
    assert_eq!(turns[before].author, Author::User);
    assert_eq!(turns[before].content, "hello world");
    assert_eq!(turns[before + 1].author, Author::Assistant);
    assert_eq!(turns[before + 1].content, "you said: hello world");
}

#[tokio::test]
async fn a_silent_recording_appends_nothing() {
    let mut convo = ConversationController::new(Box::new(EchoChat), Box::new(NoImage));
    let mut session = VoiceSession::new(
        Box::new(OneChunkCapture),
        Box::new(SilentSink),
        Box::new(PlaceholderStt::new()),
        Box::new(PlaceholderTts),
    );
    let before = convo.transcript().len();

    convo.submit_voice(&mut session).await;
    convo.submit_voice(&mut session).await;

    assert_eq!(convo.transcript().len(), before);
}

#[tokio::test]
async fn auto_speak_flows_from_the_speech_channel_into_the_session() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut convo =
        ConversationController::new(Box::new(EchoChat), Box::new(NoImage)).with_speech_channel(tx);
    let mut session = VoiceSession::new(
        Box::new(OneChunkCapture),
        Box::new(SilentSink),
        Box::new(PlaceholderStt::new()),
        Box::new(PlaceholderTts),
    );

    convo.submit_text("good morning").await;

    let reply = rx.try_recv().unwrap();
    assert_eq!(reply, "you said: good morning");
    // Placeholder TTS produces no audio, so the session returns to idle.
    session.speak(&reply).await.unwrap();
    assert!(!session.is_playing());
}
