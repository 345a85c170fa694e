//! Interactive console session: drives the conversation and voice
//! controllers against the real providers from a terminal.
//!
//! The whole session runs on a dedicated thread with its own runtime: the
//! cpal stream and rodio sink are not `Send`, so they stay pinned here. The
//! loop is modal; each submit completes before the next command is read, so
//! overlapping gateway calls cannot occur.

use async_trait::async_trait;
use bart_core::{
    ChatBackend, ConversationController, GatewayResult, HistoryTurn, ImageBackend, MistralChat,
    StabilityImage, Turn, TurnKind,
};
use bart_voice::{
    AudioConfig, DeepgramStt, DeepgramTts, MicCapture, PlaceholderStt, PlaceholderTts,
    PlaybackSink, SpeakerOutput, SttBackend, TtsBackend, VoiceResult, VoiceSession,
};
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Chat backend that re-reads credentials per request, so a key added to the
/// environment is picked up without restarting the console.
struct EnvChat;

#[async_trait]
impl ChatBackend for EnvChat {
    async fn complete(&self, message: &str, history: &[HistoryTurn]) -> GatewayResult<String> {
        MistralChat::from_env()?.complete(message, history).await
    }
}

struct EnvImage;

#[async_trait]
impl ImageBackend for EnvImage {
    async fn generate(&self, prompt: &str) -> GatewayResult<String> {
        StabilityImage::from_env()?.generate(prompt).await
    }
}

/// Sink used when no output device is available; keeps the session usable.
struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&mut self, _bytes: &[u8]) -> VoiceResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

pub fn run() {
    let handle = std::thread::spawn(|| {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                warn!("console: runtime start failed: {e}");
                return;
            }
        };
        rt.block_on(session_loop());
    });
    let _ = handle.join();
}

fn build_voice_session() -> VoiceSession {
    let stt: Box<dyn SttBackend> = match DeepgramStt::from_env() {
        Ok(s) => {
            info!("STT: Deepgram (cloud)");
            Box::new(s)
        }
        Err(_) => {
            info!("STT: placeholder (set DEEPGRAM_API_KEY for transcription)");
            Box::new(PlaceholderStt::new())
        }
    };
    let tts: Box<dyn TtsBackend> = match DeepgramTts::from_env() {
        Ok(t) => {
            info!("TTS: Deepgram aura-asteria-en (cloud)");
            Box::new(t)
        }
        Err(_) => {
            info!("TTS: placeholder (set DEEPGRAM_API_KEY for speech)");
            Box::new(PlaceholderTts)
        }
    };
    let playback: Box<dyn PlaybackSink> = match SpeakerOutput::new() {
        Ok(out) => Box::new(out),
        Err(e) => {
            warn!("no output device, replies will not be spoken: {e}");
            Box::new(NullSink)
        }
    };
    VoiceSession::new(
        Box::new(MicCapture::new(AudioConfig::default())),
        playback,
        stt,
        tts,
    )
}

async fn session_loop() {
    let (speech_tx, mut speech_rx) = mpsc::unbounded_channel();
    let mut convo = ConversationController::new(Box::new(EnvChat), Box::new(EnvImage))
        .with_speech_channel(speech_tx);
    let mut session = build_voice_session();

    println!("Bart console. Plain text chats; /image <prompt>, /voice, /stop, /quit.");
    let mut rendered = render_new_turns(&convo, 0);

    let stdin = std::io::stdin();
    loop {
        let prompt = if session.is_recording() { "recording> " } else { "> " };
        print!("{prompt}");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }
        let line = line.trim();

        match line {
            "/quit" | "/exit" => break,
            "/stop" => {
                session.stop_speaking();
                convo.note_status("[stopped speaking]");
            }
            "/voice" => convo.submit_voice(&mut session).await,
            _ if line.starts_with("/image") => {
                convo
                    .submit_image_prompt(line.trim_start_matches("/image").trim())
                    .await;
            }
            "" => {}
            _ => convo.submit_text(line).await,
        }

        // Auto-speak is fire-and-forget: failures are logged, never rendered.
        while let Ok(reply) = speech_rx.try_recv() {
            if let Err(e) = session.speak(&reply).await {
                warn!("auto-speak failed: {e}");
            }
        }
        session.poll_playback();
        rendered = render_new_turns(&convo, rendered);
    }
}

fn render_new_turns(convo: &ConversationController, from: usize) -> usize {
    let turns = convo.transcript();
    for turn in &turns[from..] {
        render_turn(turn);
    }
    turns.len()
}

fn render_turn(turn: &Turn) {
    let who = if turn.is_user() { "you" } else { "bart" };
    match turn.kind {
        TurnKind::Image => {
            let size = turn.image_ref.as_deref().map(str::len).unwrap_or(0);
            println!("[{who}] {} (inline image, {size} bytes)", turn.content);
        }
        TurnKind::Status => println!("       {}", turn.content),
        TurnKind::Text => println!("[{who}] {}", turn.content),
    }
}
