// 🌐 HTTP Surface - REST API with Axum
//
// Each route maps onto one service operation. Store and PDF work is
// synchronous, so it runs on the blocking pool rather than the reactor.

use crate::error::{ServiceError, ServiceResult};
use crate::filter::FilterParams;
use crate::import::UploadGuard;
use crate::service::BoletoService;
use crate::splitter::parse_name_list;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tower_http::cors::CorsLayer;
use tracing::error;

/// Scanned boleto batches easily exceed axum's 2 MB default
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: BoletoService,
    pub upload_dir: PathBuf,
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            kind: None,
            error: None,
        }
    }
}

/// Service error rendered as an HTTP response
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Io(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Full chain goes to the log; the body only carries the display text
        error!(kind = self.0.kind(), "request failed: {:?}", self.0);

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            kind: Some(self.0.kind()),
            error: Some(self.0.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(ServiceError::io(format!("worker task failed: {}", e))))?
        .map_err(ApiError)
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddBatchRequest {
    #[serde(default, alias = "name")]
    nome: Option<String>,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AddBatchResponse {
    id: i64,
    created: bool,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RenumberRequest {
    #[serde(alias = "from")]
    de: i64,
    #[serde(alias = "to")]
    para: i64,
}

/// Listing query. Kept as strings so `?valor_inicial=` reads as "absent".
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    nome: Option<String>,
    valor_inicial: Option<String>,
    valor_final: Option<String>,
    id_lote: Option<String>,
    relatorio: Option<String>,
}

impl ListQuery {
    fn filter_params(&self) -> ServiceResult<FilterParams> {
        Ok(FilterParams {
            name: self.nome.clone().filter(|n| !n.is_empty()),
            value_min: parse_number(&self.valor_inicial, "valor_inicial")?,
            value_max: parse_number(&self.valor_final, "valor_final")?,
            batch_id: parse_number(&self.id_lote, "id_lote")?,
        })
    }

    fn wants_report(&self) -> bool {
        self.relatorio.as_deref() == Some("1")
    }
}

fn parse_number<T: std::str::FromStr>(raw: &Option<String>, field: &str) -> ServiceResult<Option<T>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::validation(format!("{} must be a number", field))),
    }
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    base64: String,
}

#[derive(Debug, Serialize)]
struct SplitResponse {
    pages: Vec<SplitPageResponse>,
}

#[derive(Debug, Serialize)]
struct SplitPageResponse {
    record_id: i64,
    page_index: usize,
    file: String,
}

// ============================================================================
// Uploads
// ============================================================================

/// Spooled multipart form: the `file` part on disk, everything else as text
struct UploadForm {
    file: Option<UploadGuard>,
    fields: HashMap<String, String>,
}

async fn read_upload(upload_dir: &Path, mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::validation(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServiceError::validation(format!("failed to read upload: {}", e)))?;
            form.file = Some(spool(upload_dir, &bytes)?);
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ServiceError::validation(format!("failed to read field {}: {}", name, e)))?;
            form.fields.insert(name, text);
        }
    }

    Ok(form)
}

fn spool(upload_dir: &Path, bytes: &[u8]) -> ServiceResult<UploadGuard> {
    let io_err = |e: std::io::Error| ServiceError::io(format!("failed to spool upload: {}", e));

    std::fs::create_dir_all(upload_dir).map_err(io_err)?;
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(upload_dir)
        .map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;

    let path = file
        .into_temp_path()
        .keep()
        .map_err(|e| ServiceError::io(format!("failed to spool upload: {}", e)))?;
    Ok(UploadGuard::new(path))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/lotes - Create a batch or return the existing one
async fn add_batch(
    State(state): State<AppState>,
    Json(request): Json<AddBatchRequest>,
) -> ApiResult<Response> {
    let name = request.nome.unwrap_or_default();
    let explicit_id = request.id;

    let outcome = blocking(move || state.service.add_batch(&name, explicit_id)).await?;

    let (status, message) = if outcome.created {
        (StatusCode::CREATED, "Lote criado com sucesso!".to_string())
    } else {
        (StatusCode::OK, "Lote já existe.".to_string())
    };

    let body = AddBatchResponse {
        id: outcome.id,
        created: outcome.created,
        message,
    };
    Ok((status, Json(ApiResponse::ok(body))).into_response())
}

/// POST /api/lotes/renumerar - Administrative batch id override
async fn renumber_batch(
    State(state): State<AppState>,
    Json(request): Json<RenumberRequest>,
) -> ApiResult<Response> {
    let RenumberRequest { de, para } = request;
    blocking(move || state.service.renumber_batch(de, para)).await?;
    Ok(Json(ApiResponse::ok(para)).into_response())
}

/// POST /api/importar-csv - Import an uploaded CSV
async fn import_csv(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = read_upload(&state.upload_dir, multipart).await?;
    let upload = form
        .file
        .ok_or_else(|| ServiceError::validation("multipart field \"file\" is required"))?;

    let summary = blocking(move || state.service.import_upload(upload)).await?;
    Ok(Json(ApiResponse::ok(summary)).into_response())
}

/// POST /api/importar-pdf - Split an uploaded PDF by the ordering in `ordem`
async fn split_pdf(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = read_upload(&state.upload_dir, multipart).await?;
    let upload = form
        .file
        .ok_or_else(|| ServiceError::validation("multipart field \"file\" is required"))?;
    let names = parse_name_list(form.fields.get("ordem").map(String::as_str).unwrap_or_default())?;

    let outputs = blocking(move || state.service.split_upload(upload, &names)).await?;

    let pages = outputs
        .into_iter()
        .map(|out| SplitPageResponse {
            record_id: out.record_id,
            page_index: out.page_index,
            file: out.path.display().to_string(),
        })
        .collect();
    Ok(Json(ApiResponse::ok(SplitResponse { pages })).into_response())
}

/// GET /api/boletos - Filtered listing, or a PDF report with `relatorio=1`
async fn list_boletos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let params = query.filter_params()?;

    if query.wants_report() {
        let pdf = blocking(move || state.service.report(&params)).await?;
        let base64 = base64::engine::general_purpose::STANDARD.encode(pdf);
        return Ok(Json(ApiResponse::ok(ReportResponse { base64 })).into_response());
    }

    let boletos = blocking(move || state.service.query(&params)).await?;
    Ok(Json(ApiResponse::ok(boletos)).into_response())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/lotes", post(add_batch))
        .route("/lotes/renumerar", post(renumber_batch))
        .route("/importar-csv", post(import_csv))
        .route("/importar-pdf", post(split_pdf))
        .route("/boletos", get(list_boletos))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
