//! HTTP API for notes summarization.
//!
//! Routes bind form and file input to the extractor, summarizer, speech
//! generator and history ledger, and return JSON (or a PDF/audio body).
//! Blocking work (SQLite, PDF parsing/rendering) runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;
use crate::export::render_summary_pdf;
use crate::extractor::{self, DocumentKind};
use crate::history::{ActionLabel, HistoryEntry, HistoryLedger, UsageStats};
use crate::speech::{SpeechSynthesizer, VoiceGenerator};
use crate::summarizer::{Summarizer, SummarySource};
use crate::users::{User, UserStore};

pub type Voice = VoiceGenerator<Box<dyn SpeechSynthesizer>>;

#[derive(Clone)]
pub struct AppState {
    pub summarizer: Arc<Summarizer>,
    pub ledger: Arc<HistoryLedger>,
    pub users: Arc<UserStore>,
    /// `None` when text-to-speech is disabled.
    pub voice: Option<Arc<Voice>>,
    pub upload_dir: PathBuf,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct TextForm {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct SummaryTextForm {
    #[serde(default)]
    summary_text: String,
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct StatusResponse {
    primary_model: String,
    primary_ready: bool,
    tts_enabled: bool,
}

#[derive(Serialize, Default)]
struct SummaryResponse {
    message: String,
    original_text: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SummarySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_id: Option<i64>,
}

impl SummaryResponse {
    fn message(message: &str, original_text: String) -> Self {
        Self {
            message: message.into(),
            original_text,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct AudioResponse {
    audio_url: String,
}

/// Build the axum router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/upload", post(handle_upload))
        .route("/summary", post(handle_summary))
        .route("/text-to-speech", post(handle_text_to_speech))
        .route("/static/audio/{file}", get(handle_audio))
        .route("/download_summary", post(handle_download_summary))
        .route("/history", get(handle_history))
        .route("/history/{id}", get(handle_history_detail))
        .route("/dashboard", get(handle_dashboard))
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(app: Router, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutting down");
        })
        .await
}

/// Run a blocking closure on the blocking pool.
async fn blocking<T, E, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}

async fn record(
    ledger: &Arc<HistoryLedger>,
    action: ActionLabel,
    source_name: String,
    excerpt: String,
) -> Result<HistoryEntry, AppError> {
    let ledger = ledger.clone();
    blocking(move || ledger.record(action, &source_name, &excerpt)).await
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

// --- Handlers ---

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let primary = state.summarizer.primary_state();
    Json(StatusResponse {
        primary_model: primary.describe(),
        primary_ready: primary.is_ready(),
        tts_enabled: state.voice.is_some(),
    })
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SummaryResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("notes_file") {
            continue;
        }
        let Some(filename) = field.file_name().and_then(sanitize_filename) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Ok(Json(SummaryResponse::message("No file selected.", String::new())));
    };
    info!("Upload: {filename} ({} bytes)", bytes.len());

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("create upload dir: {e}")))?;
    tokio::fs::write(state.upload_dir.join(&filename), &bytes)
        .await
        .map_err(|e| AppError::Internal(format!("save upload: {e}")))?;

    let kind = match DocumentKind::from_filename(&filename) {
        Ok(kind) => kind,
        Err(e) => {
            info!("Not extracting {filename}: {e}");
            return Ok(Json(SummaryResponse::message(
                "No readable text found.",
                String::new(),
            )));
        }
    };

    let extraction = tokio::task::spawn_blocking(move || extractor::extract(&bytes, kind)).await?;
    let original_text = match extraction {
        Ok(extraction) => extraction.text,
        Err(e) => {
            info!("Nothing to summarize in upload: {e}");
            return Ok(Json(SummaryResponse::message(
                "No readable text found.",
                String::new(),
            )));
        }
    };

    let summary = state.summarizer.summarize(&original_text).await?;
    let entry = record(
        &state.ledger,
        ActionLabel::UploadSummarize,
        filename,
        summary.text.clone(),
    )
    .await?;

    Ok(Json(SummaryResponse {
        message: "File summarized successfully!".into(),
        original_text,
        summary: summary.text,
        source: Some(summary.source),
        history_id: Some(entry.id),
    }))
}

async fn handle_summary(
    State(state): State<AppState>,
    Form(form): Form<TextForm>,
) -> Result<Json<SummaryResponse>, AppError> {
    let original_text = form.text.trim().to_string();
    if original_text.is_empty() {
        return Ok(Json(SummaryResponse::message("No text provided.", original_text)));
    }

    let summary = state.summarizer.summarize(&original_text).await?;
    let entry = record(
        &state.ledger,
        ActionLabel::TextSummarize,
        "Text Input".into(),
        summary.text.clone(),
    )
    .await?;

    Ok(Json(SummaryResponse {
        message: String::new(),
        original_text,
        summary: summary.text,
        source: Some(summary.source),
        history_id: Some(entry.id),
    }))
}

async fn handle_text_to_speech(
    State(state): State<AppState>,
    Form(form): Form<TextForm>,
) -> Result<Json<AudioResponse>, AppError> {
    let Some(voice) = state.voice.clone() else {
        return Err(AppError::Unavailable("Text-to-speech is disabled".into()));
    };

    let text = form.text.trim().to_string();
    let audio = voice.generate(&text).await?;
    info!("Voice saved to {}", audio.path.display());

    record(
        &state.ledger,
        ActionLabel::VoiceGenerated,
        audio.file_name.clone(),
        text,
    )
    .await?;

    Ok(Json(AudioResponse {
        audio_url: format!("/static/audio/{}", audio.file_name),
    }))
}

async fn handle_audio(
    State(state): State<AppState>,
    UrlPath(file): UrlPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let not_found = || AppError::NotFound("Audio not found".into());
    let Some(voice) = state.voice.as_ref() else {
        return Err(not_found());
    };
    if sanitize_filename(&file).as_deref() != Some(file.as_str()) {
        return Err(not_found());
    }

    let path: PathBuf = voice.audio_dir().join(Path::new(&file));
    let bytes = tokio::fs::read(&path).await.map_err(|_| not_found())?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes))
}

async fn handle_download_summary(
    Form(form): Form<SummaryTextForm>,
) -> Result<impl IntoResponse, AppError> {
    let summary_text = form.summary_text.trim().to_string();
    if summary_text.is_empty() {
        return Err(AppError::BadRequest("No summary text".into()));
    }

    let pdf = blocking(move || render_summary_pdf(&summary_text)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"summary.pdf\""),
        ],
        pdf,
    ))
}

async fn handle_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let ledger = state.ledger.clone();
    Ok(Json(blocking(move || ledger.list_all()).await?))
}

async fn handle_history_detail(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<i64>,
) -> Result<Json<HistoryEntry>, AppError> {
    let ledger = state.ledger.clone();
    Ok(Json(blocking(move || ledger.get(id)).await?))
}

async fn handle_dashboard(State(state): State<AppState>) -> Result<Json<UsageStats>, AppError> {
    let ledger = state.ledger.clone();
    Ok(Json(blocking(move || ledger.stats()).await?))
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<User>, AppError> {
    let users = state.users.clone();
    Ok(Json(
        blocking(move || users.register(&req.username, &req.password)).await?,
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<User>, AppError> {
    let users = state.users.clone();
    Ok(Json(
        blocking(move || users.authenticate(&req.username, &req.password)).await?,
    ))
}
