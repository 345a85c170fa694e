//! Bart gateway: the HTTP surface for the chat, image, and speech providers,
//! plus an interactive console session (`--console`).
//!
//! All four endpoints are stateless: credentials are read from the process
//! environment per request and never echoed back. Provider error detail is
//! logged for operators; clients get the documented generic messages.

mod console;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bart_core::{ChatBackend, GatewayError, HistoryTurn, ImageBackend, MistralChat, ServerConfig, StabilityImage};
use bart_voice::{DeepgramStt, DeepgramTts, SealedAudio, SttBackend, TtsBackend};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Deserialize)]
struct ChatApiRequest {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "chatHistory")]
    chat_history: Vec<HistoryTurn>,
}

#[derive(Deserialize)]
struct ImageApiRequest {
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
struct SpeakApiRequest {
    #[serde(default)]
    text: String,
}

#[tokio::main]
async fn main() {
    // Load .env first: provider keys stay in the backend process only.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[bart-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::args().any(|a| a == "--console") {
        console::run();
        return;
    }

    let config = ServerConfig::from_env();
    let addr = config.bind_addr();
    let app = build_app();
    tracing::info!("bart-gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn build_app() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/generate-image", post(generate_image))
        .route("/api/speech-to-text", post(speech_to_text))
        .route("/api/text-to-speech", post(text_to_speech))
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Map a gateway failure onto the documented statuses. `upstream_message`
/// replaces provider detail for the client; the detail itself only reaches
/// the log.
fn error_response(err: GatewayError, upstream_message: &str) -> Response {
    tracing::error!("gateway failure: {err}");
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match &err {
        GatewayError::Validation(msg) | GatewayError::Config(msg) => msg.clone(),
        GatewayError::Upstream { .. } => upstream_message.to_string(),
        GatewayError::Transport(_) => "Internal server error".to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
}

async fn chat(Json(req): Json<ChatApiRequest>) -> Response {
    if req.message.is_empty() {
        return bad_request("Message is required");
    }
    let backend = match MistralChat::from_env() {
        Ok(b) => b,
        Err(e) => return error_response(e, "Failed to get AI response"),
    };
    match backend.complete(&req.message, &req.chat_history).await {
        Ok(message) => Json(json!({ "message": message })).into_response(),
        Err(e) => error_response(e, "Failed to get AI response"),
    }
}

async fn generate_image(Json(req): Json<ImageApiRequest>) -> Response {
    if req.prompt.is_empty() {
        return bad_request("Prompt is required");
    }
    let backend = match StabilityImage::from_env() {
        Ok(b) => b,
        Err(e) => return error_response(e, "Failed to generate image"),
    };
    match backend.generate(&req.prompt).await {
        Ok(image_url) => Json(json!({ "imageUrl": image_url })).into_response(),
        Err(e) => error_response(e, "Failed to generate image"),
    }
}

async fn speech_to_text(mut multipart: Multipart) -> Response {
    let mut audio: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("audio") {
            match field.bytes().await {
                Ok(bytes) => audio = Some(bytes.to_vec()),
                Err(e) => tracing::error!("audio field read failed: {e}"),
            }
            break;
        }
    }
    let Some(bytes) = audio.filter(|b| !b.is_empty()) else {
        return bad_request("Audio file is required");
    };

    let backend = match DeepgramStt::from_env() {
        Ok(b) => b,
        Err(e) => return error_response(e, "Failed to transcribe audio"),
    };
    match backend.transcribe(&SealedAudio::from_wav(bytes)).await {
        Ok(transcript) => Json(json!({ "transcript": transcript })).into_response(),
        Err(e) => error_response(e, "Failed to transcribe audio"),
    }
}

async fn text_to_speech(Json(req): Json<SpeakApiRequest>) -> Response {
    if req.text.is_empty() {
        return bad_request("Text is required");
    }
    let backend = match DeepgramTts::from_env() {
        Ok(b) => b,
        Err(e) => return error_response(e, "Failed to generate speech"),
    };
    match backend.synthesize(&req.text).await {
        Ok(bytes) => Json(json!({
            "audioUrl": format!("data:audio/wav;base64,{}", BASE64.encode(&bytes))
        }))
        .into_response(),
        Err(e) => error_response(e, "Failed to generate speech"),
    }
}
