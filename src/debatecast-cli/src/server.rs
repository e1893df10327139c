//! HTTP front end for the generator.
//!
//! `POST /generate` runs a whole debate inside the request, so clients should
//! expect responses to take minutes.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use debatecast_core::{Config, DebateError, DebateEvent, DebateGenerator};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::clamp_rounds;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    topic: String,
    rounds: Option<u32>,
    /// Per-request lip-sync endpoint, e.g. a tunnel to a GPU notebook.
    #[serde(alias = "colab_url")]
    lipsync_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    success: bool,
    video_path: String,
    filename: String,
    session_id: String,
    clips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
    kind: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

const DEFAULT_ROUNDS: u32 = 2;

pub fn router(config: Config) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/download/:filename", get(download))
        .route("/health", get(health))
        .with_state(AppState {
            config: Arc::new(config),
        })
}

pub async fn serve(config: Config, bind: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, router(config)).await?;
    Ok(())
}

async fn generate(State(state): State<AppState>, Json(request): Json<GenerateRequest>) -> Response {
    let mut config = (*state.config).clone();
    if let Some(url) = request.lipsync_url.filter(|u| !u.trim().is_empty()) {
        config.services.lipsync_url = url;
    }
    let rounds = clamp_rounds(
        request.rounds.unwrap_or(DEFAULT_ROUNDS),
        config.output.max_rounds,
    );

    let generator = match DebateGenerator::from_config(&config).await {
        Ok(generator) => generator.with_callback(Box::new(log_event)),
        Err(e) => return error_response(e),
    };

    match generator.generate_debate(&request.topic, rounds).await {
        Ok(result) => {
            let filename = result
                .video_path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            Json(GenerateResponse {
                success: true,
                video_path: result.video_path.display().to_string(),
                filename,
                session_id: result.session_id,
                clips: result.clip_ids,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

fn error_response(e: DebateError) -> Response {
    error!("Debate request failed: {}", e);
    let status = if e.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: e.to_string(),
            kind: e.kind().to_string(),
        }),
    )
        .into_response()
}

fn log_event(event: DebateEvent) {
    match event {
        DebateEvent::TextReady {
            turn_id, fallback, ..
        } if fallback => info!("{}: using fallback argument", turn_id),
        DebateEvent::TurnDropped {
            turn_id,
            stage,
            reason,
        } => info!("{}: dropped at {} stage ({})", turn_id, stage, reason),
        DebateEvent::DebateEnd { video_path } => info!("Wrote {}", video_path.display()),
        _ => {}
    }
}

/// Only bare file names produced by the generator may be downloaded.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && name.ends_with(".mp4")
}

async fn download(State(state): State<AppState>, UrlPath(filename): UrlPath<String>) -> Response {
    if !is_safe_filename(&filename) {
        return (StatusCode::BAD_REQUEST, "invalid filename").into_response();
    }

    let path = Path::new(&state.config.output.dir).join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "no such video").into_response(),
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "debatecast".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
