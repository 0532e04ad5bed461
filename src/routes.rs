//! HTTP surface: the form, submissions, the weekly download and a health check.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    Config, Error, Record, StyleOptions, SubmissionForm, record_submission,
    week::{self, Clock},
};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub style: Arc<StyleOptions>,
    pub clock: Arc<dyn Clock>,
    /// Held for the whole read-modify-write of a submission.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        let style = StyleOptions {
            column_padding: config.column_padding,
            ..StyleOptions::default()
        };
        Self {
            config: Arc::new(config),
            style: Arc::new(style),
            clock,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn current_file_name(&self) -> String {
        week::weekly_file_name(&self.config.file_prefix, &self.clock.now())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit))
        .route("/download", get(download))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, Error> {
    let path = &state.config.form_page;
    let page = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::FormPage {
            path: path.clone(),
            source,
        })?;
    Ok(Html(page))
}

async fn submit(
    State(state): State<AppState>,
    Form(form): Form<SubmissionForm>,
) -> Result<Html<String>, Error> {
    let record = Record::from_form(form);

    let _guard = state.write_lock.lock().await;
    let now = state.clock.now();
    let config = Arc::clone(&state.config);
    let style = Arc::clone(&state.style);
    let outcome =
        tokio::task::spawn_blocking(move || record_submission(&config, &style, &now, &record))
            .await??;

    info!(
        file = %outcome.file_name,
        rows = outcome.rows,
        archived = outcome.archived.len(),
        "dashboard updated"
    );
    Ok(Html(
        "<h3>✅ Dashboard updated for this week! \
         <a href='/download'>Download</a> | <a href='/'>Go Back</a></h3>"
            .to_string(),
    ))
}

async fn download(State(state): State<AppState>) -> Result<Response, Error> {
    let file_name = state.current_file_name();
    let path = state.config.data_dir.join(&file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file_name}\""),
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok((
            StatusCode::NOT_FOUND,
            Html(format!(
                "<h3>No dashboard file for this week yet ({}). <a href='/'>Go Back</a></h3>",
                html_escape(&file_name)
            )),
        )
            .into_response()),
        Err(err) => Err(Error::io(path, err)),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        match self {
            // a missing static asset is a plain server error
            Error::FormPage { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    "<h3>❌ Error: {}</h3><a href='/'>Go Back</a>",
                    html_escape(&other.to_string())
                )),
            )
                .into_response(),
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
