use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::render::{index_page, Notice, PageView};
use crate::search::{search_documents, search_with_limits, SearchError};
use crate::state::AppState;
use crate::store::{secure_filename, StoreError};
use crate::types::{DocumentMatches, FileListing, Match, SearchResponse};

const MSG_NO_SOURCE: &str = "Please choose a JSON file to upload or select an existing one.";
const MSG_NO_TERM: &str = "Please enter a key to search.";
const MSG_BAD_TYPE: &str = "Invalid file type. Please upload a .json file only.";
const MSG_MISSING: &str = "Selected JSON file does not exist.";

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/delete/{*filename}", post(delete_file))
        .route("/api/files", get(api_list_files))
        .route("/api/files/{filename}/search", get(api_search_file))
        .route("/api/search", get(api_search_all).post(api_search_document))
        .route("/healthz", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Serve `router` until ctrl-c.
pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::InvalidFileType(_) | StoreError::InvalidName(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Decode { .. }) | ApiError::Search(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Store(StoreError::Io { .. }) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Store(StoreError::InvalidFileType(_)) => "invalid_file_type",
            ApiError::Store(StoreError::InvalidName(_)) => "invalid_file_name",
            ApiError::Store(StoreError::NotFound(_)) => "not_found",
            ApiError::Store(StoreError::Decode { .. }) => "invalid_json",
            ApiError::Search(SearchError::DepthLimitExceeded { .. }) => "depth_limit_exceeded",
            ApiError::Store(StoreError::Io { .. }) | ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({"error": {"code": self.code(), "message": self.to_string()}}));
        (status, body).into_response()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Join error: {e}")))?
}

fn required_term(term: Option<&str>) -> Result<String, ApiError> {
    match term.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(ApiError::BadRequest(MSG_NO_TERM.to_string())),
    }
}

// ---------------------------------------------------------------------------
// HTML form flow
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct NoticeParams {
    notice: Option<String>,
    error: Option<String>,
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct SearchForm {
    upload: Option<Upload>,
    existing_file: String,
    key_term: String,
}

struct FormOutcome {
    filename: String,
    matches: Vec<Match>,
}

struct FormFailure {
    status: StatusCode,
    message: String,
}

impl FormFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

async fn index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NoticeParams>,
) -> Result<Html<String>, ApiError> {
    let mut notices = Vec::new();
    if let Some(text) = params.notice.filter(|t| !t.is_empty()) {
        notices.push(Notice::info(text));
    }
    if let Some(text) = params.error.filter(|t| !t.is_empty()) {
        notices.push(Notice::error(text));
    }
    let files = list_files(&state).await?;
    Ok(Html(index_page(&PageView { notices: &notices, files: &files, ..Default::default() })))
}

async fn submit(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, "malformed search form");
            let failure = FormFailure::new(e.status(), format!("Could not read the submitted form: {e}"));
            return render_failure(&state, failure, "", "").await;
        }
    };

    let key_term = form.key_term.clone();
    let existing = form.existing_file.clone();
    let worker_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || run_form_search(&worker_state, form))
        .await
        .unwrap_or_else(|e| {
            Err(FormFailure::new(StatusCode::INTERNAL_SERVER_ERROR, format!("Join error: {e}")))
        });

    match outcome {
        Ok(FormOutcome { filename, matches }) => {
            tracing::info!(document = %filename, term = %key_term, matches = matches.len(), "search finished");
            let files = match list_files(&state).await {
                Ok(files) => files,
                Err(e) => return e.into_response(),
            };
            Html(index_page(&PageView {
                files: &files,
                key_term: &key_term,
                filename: &filename,
                results: Some(&matches),
                ..Default::default()
            }))
            .into_response()
        }
        Err(failure) => {
            tracing::warn!(status = %failure.status, message = %failure.message, "search form rejected");
            render_failure(&state, failure, &key_term, &existing).await
        }
    }
}

async fn render_failure(
    state: &Arc<AppState>,
    failure: FormFailure,
    key_term: &str,
    filename: &str,
) -> Response {
    let files = match list_files(state).await {
        Ok(files) => files,
        Err(e) => return e.into_response(),
    };
    let notices = [Notice::error(failure.message)];
    let page = index_page(&PageView {
        notices: &notices,
        files: &files,
        key_term,
        filename,
        results: None,
    });
    (failure.status, Html(page)).into_response()
}

async fn read_form(mut multipart: Multipart) -> Result<SearchForm, MultipartError> {
    let mut form = SearchForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "json_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if !filename.is_empty() {
                    form.upload = Some(Upload { filename, bytes: bytes.to_vec() });
                }
            }
            "existing_file" => form.existing_file = field.text().await?.trim().to_string(),
            "key_term" => form.key_term = field.text().await?.trim().to_string(),
            _ => {}
        }
    }
    Ok(form)
}

fn run_form_search(state: &AppState, form: SearchForm) -> Result<FormOutcome, FormFailure> {
    if form.upload.is_none() && form.existing_file.is_empty() {
        return Err(FormFailure::new(StatusCode::BAD_REQUEST, MSG_NO_SOURCE));
    }
    if form.key_term.is_empty() {
        return Err(FormFailure::new(StatusCode::BAD_REQUEST, MSG_NO_TERM));
    }

    let (filename, doc) = match form.upload {
        Some(upload) => state.store.save(&upload.filename, &upload.bytes).map_err(|e| match e {
            StoreError::InvalidFileType(_) | StoreError::InvalidName(_) => {
                FormFailure::new(StatusCode::BAD_REQUEST, MSG_BAD_TYPE)
            }
            other => load_failure(other),
        })?,
        None => {
            let name = secure_filename(&form.existing_file);
            let doc = state.store.read(&form.existing_file).map_err(load_failure)?;
            (name, doc)
        }
    };

    let matches = search_with_limits(&doc, &form.key_term, state.limits).map_err(|e| {
        FormFailure::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Search failed: {e}"))
    })?;
    Ok(FormOutcome { filename, matches })
}

fn load_failure(err: StoreError) -> FormFailure {
    match err {
        StoreError::NotFound(_) | StoreError::InvalidName(_) => {
            FormFailure::new(StatusCode::NOT_FOUND, MSG_MISSING)
        }
        StoreError::Decode { source, .. } => FormFailure::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Failed to parse JSON file: {source}"),
        ),
        StoreError::InvalidFileType(_) => FormFailure::new(StatusCode::BAD_REQUEST, MSG_BAD_TYPE),
        StoreError::Io { name, source } => FormFailure::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to access {name}: {source}"),
        ),
    }
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Redirect {
    let result = tokio::task::spawn_blocking(move || state.store.delete(&filename)).await;
    let target = match result {
        Ok(Ok(name)) => format!("/?notice={}", urlencoding::encode(&format!("Deleted {name}."))),
        Ok(Err(StoreError::NotFound(_) | StoreError::InvalidName(_))) => {
            format!("/?error={}", urlencoding::encode("File not found."))
        }
        Ok(Err(e)) => {
            let name = match &e {
                StoreError::Io { name, .. } | StoreError::Decode { name, .. } => name.clone(),
                _ => String::new(),
            };
            tracing::error!(error = %e, "delete failed");
            format!("/?error={}", urlencoding::encode(&format!("Failed to delete {name}: {e}")))
        }
        Err(e) => format!("/?error={}", urlencoding::encode(&format!("Join error: {e}"))),
    };
    Redirect::to(&target)
}

async fn list_files(state: &Arc<AppState>) -> Result<Vec<String>, ApiError> {
    let state = state.clone();
    blocking(move || Ok(state.store.list()?)).await
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    term: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    document: Value,
    term: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn api_list_files(State(state): State<Arc<AppState>>) -> Result<Json<FileListing>, ApiError> {
    let files = list_files(&state).await?;
    Ok(Json(FileListing { files }))
}

async fn api_search_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let term = required_term(params.term.as_deref())?;
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(state.page_size);

    let response = blocking(move || {
        let doc = state.store.read(&filename)?;
        let matches = search_with_limits(&doc, &term, state.limits)?;
        tracing::info!(document = %filename, term = %term, matches = matches.len(), "api search finished");
        Ok(SearchResponse::page(matches, offset, limit))
    })
    .await?;
    Ok(Json(response))
}

async fn api_search_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<DocumentMatches>>, ApiError> {
    let term = required_term(params.term.as_deref())?;
    let results = blocking(move || {
        let docs = state.store.read_all()?;
        Ok(search_documents(&docs, &term, state.limits))
    })
    .await?;
    Ok(Json(results))
}

async fn api_search_document(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let term = required_term(Some(request.term.as_str()))?;
    let offset = request.offset.unwrap_or(0);
    let limit = request.limit.unwrap_or(state.page_size);
    let document = request.document;

    let response = blocking(move || {
        let matches = search_with_limits(&document, &term, state.limits)?;
        Ok(SearchResponse::page(matches, offset, limit))
    })
    .await?;
    Ok(Json(response))
}
