use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::config::Configuration;
use crate::engine::{EngineGateway, EngineHandle, XlsxEngine};
use crate::error::PipelineError;
use crate::pipeline::{Outcome, PipelineController, PipelineStatus, TransformTicket};
use crate::session::PreviewResult;
use crate::settings::{ReprocessPolicy, Settings};

/// Multipart field carrying the uploaded workbook.
pub const UPLOAD_FIELD: &str = "spreadsheet";

/// One session shared by every request.
///
/// The controller lock is released while a transform runs so configuration
/// edits and new uploads can overtake it; the controller then drops the
/// stale result when it comes back.
pub struct AppState {
    controller: Mutex<PipelineController>,
    gateway: Arc<EngineGateway>,
}

impl AppState {
    /// Share `controller` between request handlers.
    ///
    /// # Arguments
    /// * `controller` - The session's pipeline controller
    ///
    /// # Returns
    /// * `AppState` - State to pass to [`router`]
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use prettysheet::app::{AppState, router};
    /// use prettysheet::{PipelineController, Settings, XlsxEngine};
    ///
    /// let settings = Settings::default();
    /// let controller = PipelineController::with_engine(Arc::new(XlsxEngine::new()), &settings);
    /// let _app = router(Arc::new(AppState::new(controller)), settings.max_upload_bytes);
    /// ```
    pub fn new(controller: PipelineController) -> Self {
        let gateway = Arc::clone(controller.gateway());
        Self {
            controller: Mutex::new(controller),
            gateway,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    engine: EngineHandle,
    status: PipelineStatus,
    policy: ReprocessPolicy,
    generation: u64,
    configuration: Configuration,
    error: Option<String>,
    has_artifact: bool,
}

impl StatusResponse {
    fn of(controller: &PipelineController) -> Self {
        Self {
            engine: controller.engine_state(),
            status: controller.status(),
            policy: controller.policy(),
            generation: controller.generation(),
            configuration: controller.configuration().clone(),
            error: controller.error_message().map(str::to_string),
            has_artifact: controller.visible_artifact().is_some(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewResponse {
    generation: u64,
    applied: bool,
    preview: Option<PreviewResult>,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: String,
    message: String,
}

/// A pipeline error rendered as a `{status: "error", message}` JSON body.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            PipelineError::Validation(_) | PipelineError::Io(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotReady(_) => StatusCode::CONFLICT,
            PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::EngineInit(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::EngineCall(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.0.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Serve the HTTP API on `settings.bind_addr` until the process exits.
///
/// # Arguments
/// * `settings` - Bind address, upload limit and pipeline settings
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Error if binding or serving fails
pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let controller = PipelineController::with_engine(Arc::new(XlsxEngine::new()), &settings);
    let app = router(Arc::new(AppState::new(controller)), settings.max_upload_bytes);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the `/api` routes over `state`.
///
/// # Arguments
/// * `state` - Shared session state
/// * `max_upload_bytes` - Request body limit, applied to uploads
///
/// # Returns
/// * `Router` - Routes with permissive CORS for a separately served client
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/upload", post(upload))
        .route("/api/preview", get(get_preview).post(refresh_preview))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/process", post(process))
        .route("/api/download", get(download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let controller = state.controller.lock().await;
    Json(StatusResponse::of(&controller))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<PreviewResponse>> {
    let file_data = match read_upload(&mut multipart).await {
        Ok(file_data) => file_data,
        Err(e) => return Err(state.controller.lock().await.reject_input(e).into()),
    };

    let ticket = state.controller.lock().await.begin_ingest(file_data).await?;
    let result = ticket.run(&state.gateway).await;

    let mut controller = state.controller.lock().await;
    let outcome = controller.complete_preview(ticket, result)?;
    Ok(Json(PreviewResponse {
        generation: controller.generation(),
        applied: outcome == Outcome::Applied,
        preview: controller.preview().cloned(),
    }))
}

async fn get_preview(State(state): State<Arc<AppState>>) -> Response {
    let controller = state.controller.lock().await;
    match controller.preview() {
        Some(preview) => Json(preview.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn refresh_preview(State(state): State<Arc<AppState>>) -> ApiResult<Json<PreviewResponse>> {
    let ticket = state.controller.lock().await.begin_preview()?;
    let result = ticket.run(&state.gateway).await;

    let mut controller = state.controller.lock().await;
    let outcome = controller.complete_preview(ticket, result)?;
    Ok(Json(PreviewResponse {
        generation: controller.generation(),
        applied: outcome == Outcome::Applied,
        preview: controller.preview().cloned(),
    }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Configuration> {
    let controller = state.controller.lock().await;
    Json(controller.configuration().clone())
}

async fn put_config(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Configuration>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let ticket = {
        let mut controller = state.controller.lock().await;
        match body {
            Ok(Json(configuration)) => controller.replace_configuration(configuration),
            Err(rejection) => {
                let e = PipelineError::Validation(rejection.body_text());
                return Err(controller.reject_input(e).into());
            }
        }
    };

    if let Some(ticket) = ticket {
        run_ticket(&state, ticket).await?;
    }

    let controller = state.controller.lock().await;
    Ok(Json(StatusResponse::of(&controller)))
}

async fn process(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let ticket = state.controller.lock().await.begin_transform()?;
    run_ticket(&state, ticket).await?;

    let controller = state.controller.lock().await;
    Ok(Json(StatusResponse::of(&controller)))
}

async fn run_ticket(state: &AppState, ticket: TransformTicket) -> ApiResult<Outcome> {
    let result = ticket.run(&state.gateway).await;
    let outcome = state
        .controller
        .lock()
        .await
        .complete_transform(ticket, result)?;
    Ok(outcome)
}

async fn download(State(state): State<Arc<AppState>>) -> Response {
    let controller = state.controller.lock().await;
    let Some(artifact) = controller.visible_artifact() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    (
        [
            (header::CONTENT_TYPE, artifact.mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes.clone(),
    )
        .into_response()
}

/// Pull the workbook bytes out of the `spreadsheet` field.
///
/// A missing or empty field and a malformed body are both `Io` errors.
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, PipelineError> {
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(UPLOAD_FIELD) {
            file_data = field.bytes().await.map_err(multipart_error)?.to_vec();
        }
    }

    if file_data.is_empty() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "No file data received",
        )));
    }
    Ok(file_data)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> PipelineError {
    PipelineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}
