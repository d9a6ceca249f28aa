use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::sessions::SharedSession;
use super::{Actor, ApiError, AppState, UploadSession};
use crate::domain::aggregates::{IntegratedOrder, ShippingStatus, StagedOrder};
use crate::ingest::{ingest_files, FileOutcome, FileReport, UploadMode, UploadedFile};
use crate::settlement::{CancellationOutcome, ConfirmRequest, ConfirmationOutcome, ManualOrder, PriceRefreshReport};
use crate::validation::{AliasTable, MappingReport, Suggestion, ValidationSession, ValidationStats};
use crate::views::{build_view, StatusView};
use crate::OrderError;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn validated<T: Validate>(body: T) -> Result<T, ApiError> {
    body.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(body)
}

async fn open_session(s: &AppState, actor: &Actor, id: Uuid) -> Result<SharedSession, ApiError> {
    s.sessions.get(id, actor.organization_id, s.engine.clock().now()).await.ok_or(ApiError::SessionNotFound(id))
}

// =============================================================================
// Upload sessions
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub needs_password: bool,
    pub files: Vec<FileReport>,
    pub orders: Vec<StagedOrder>,
    pub report: MappingReport,
    pub stats: ValidationStats,
    pub can_proceed: bool,
}

impl SessionView {
    fn of(session_id: Uuid, session: &UploadSession) -> Self {
        Self {
            session_id,
            needs_password: session.files.iter().any(|f| matches!(f.outcome, FileOutcome::PasswordRequired | FileOutcome::WrongPassword)),
            files: session.files.clone(),
            orders: session.validation.orders().to_vec(),
            report: session.validation.report().clone(),
            stats: session.validation.stats(),
            can_proceed: session.validation.can_proceed(),
        }
    }
}

/// Multipart fields: `files[]` (repeatable), optional `password`, optional `mode` (`market` | `standard`).
pub async fn upload(State(s): State<AppState>, actor: Actor, mut multipart: Multipart) -> ApiResult<SessionView> {
    let mut files = Vec::new();
    let mut password = None;
    let mut mode = UploadMode::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files[]" | "files" | "file" => {
                let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                files.push(UploadedFile { name: file_name, bytes: bytes.to_vec() });
            }
            "password" => {
                password = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            "mode" => {
                let raw = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                mode = match raw.trim() {
                    "" | "market" => UploadMode::Market,
                    "standard" => UploadMode::Standard,
                    other => return Err(ApiError::BadRequest(format!("unknown upload mode {other:?}"))),
                };
            }
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }
    if files.is_empty() {
        return Err(ApiError::BadRequest("no files uploaded".into()));
    }

    let templates = s.ports.templates.list_templates().await?;
    let decryptor = s.decryptor.clone();
    let ingested = tokio::task::spawn_blocking(move || {
        ingest_files(&files, password.as_deref(), mode, &templates, decryptor.as_ref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingest task failed: {e}")))?;

    if ingested.integrated_files() == 0 {
        if ingested.files.iter().any(|f| f.outcome == FileOutcome::WrongPassword) {
            return Err(OrderError::WrongPassword.into());
        }
        if !ingested.needs_password() {
            let names: Vec<&str> = ingested.files.iter().map(|f| f.file_name.as_str()).collect();
            return Err(OrderError::UnrecognizedMarket(names.join(", ")).into());
        }
    }

    let catalog = s.ports.catalog.load_catalog().await?;
    let aliases = s.ports.catalog.load_aliases(actor.organization_id).await?;
    let validation = ValidationSession::new(ingested.orders, catalog, AliasTable::from_mappings(&aliases));

    let session_id = Uuid::now_v7();
    let now = s.engine.clock().now();
    let session = UploadSession {
        organization_id: actor.organization_id,
        created_by: actor.user_id,
        created_at: now,
        files: ingested.files,
        validation,
        closed: false,
    };
    let view = SessionView::of(session_id, &session);
    s.sessions.insert(session_id, session, now).await;
    tracing::info!(%session_id, orders = view.stats.total, unmatched = view.stats.unmatched, "upload session opened");
    Ok(Json(view))
}

pub async fn get_session(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let shared = open_session(&s, &actor, id).await?;
    let session = shared.lock().await;
    Ok(Json(SessionView::of(id, &session)))
}

pub async fn discard_session(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if !s.sessions.remove(id, actor.organization_id).await {
        return Err(ApiError::SessionNotFound(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    pub option: String,
    pub limit: Option<usize>,
}

pub async fn suggestions(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(p): Query<SuggestionParams>,
) -> ApiResult<Vec<Suggestion>> {
    let shared = open_session(&s, &actor, id).await?;
    let session = shared.lock().await;
    let top_n = p.limit.filter(|n| *n > 0).unwrap_or(s.fuzzy_top_n);
    Ok(Json(session.validation.suggestions(&p.option, top_n)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CorrectionBody {
    pub index: usize,
    #[validate(length(min = 1, max = 200))]
    pub option_name: String,
}

pub async fn correct(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<CorrectionBody>,
) -> ApiResult<SessionView> {
    let body = validated(body)?;
    let shared = open_session(&s, &actor, id).await?;
    let mut session = shared.lock().await;
    if session.closed { return Err(ApiError::SessionNotFound(id)); }
    session.validation.correct(body.index, &body.option_name, s.ports.catalog.as_ref()).await?;
    Ok(Json(SessionView::of(id, &session)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkCorrectionBody {
    #[validate(length(min = 1, max = 200))]
    pub from: String,
    #[validate(length(min = 1, max = 200))]
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct BulkCorrectionResponse {
    pub changed: usize,
    #[serde(flatten)]
    pub session: SessionView,
}

pub async fn bulk_correct(
    State(s): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<BulkCorrectionBody>,
) -> ApiResult<BulkCorrectionResponse> {
    let body = validated(body)?;
    let shared = open_session(&s, &actor, id).await?;
    let mut session = shared.lock().await;
    if session.closed { return Err(ApiError::SessionNotFound(id)); }
    let changed = session.validation.bulk_correct(&body.from, &body.to, s.ports.catalog.as_ref()).await?;
    Ok(Json(BulkCorrectionResponse { changed, session: SessionView::of(id, &session) }))
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: usize,
    pub order_ids: Vec<Uuid>,
}

/// Persists the session's staged orders as registered orders and closes the session.
pub async fn save(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>) -> ApiResult<SaveResponse> {
    let shared = open_session(&s, &actor, id).await?;
    let mut session = shared.lock().await;
    if session.closed { return Err(ApiError::SessionNotFound(id)); }
    session.validation.ensure_can_proceed()?;

    let now = s.engine.clock().now();
    let mut orders: Vec<IntegratedOrder> = session.validation.orders().iter()
        .map(|staged| IntegratedOrder::register(staged, actor.organization_id, actor.user_id, now))
        .collect();
    if orders.is_empty() {
        return Err(OrderError::EmptySelection.into());
    }
    s.ports.orders.insert_orders(&orders).await?;
    session.closed = true;
    drop(session);
    s.sessions.remove(id, actor.organization_id).await;
    s.engine.publish_events(orders.iter_mut().flat_map(IntegratedOrder::take_events).collect()).await;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    tracing::info!(organization_id = %actor.organization_id, saved = order_ids.len(), "staged orders saved");
    Ok(Json(SaveResponse { saved: order_ids.len(), order_ids }))
}

// =============================================================================
// Registered and confirmed orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SelectionBody {
    pub order_ids: Vec<Uuid>,
}

/// Registers one hand-entered order.
pub async fn register_order(
    State(s): State<AppState>,
    actor: Actor,
    Json(body): Json<ManualOrder>,
) -> Result<(StatusCode, Json<IntegratedOrder>), ApiError> {
    let order = s.engine.register_manual(actor.organization_id, actor.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn refresh_prices(State(s): State<AppState>, actor: Actor) -> ApiResult<PriceRefreshReport> {
    Ok(Json(s.engine.refresh_prices(actor.organization_id).await?))
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub supply_total: i64,
    pub discount_total: i64,
    pub payable: i64,
}

pub async fn quote(State(s): State<AppState>, actor: Actor, Json(body): Json<SelectionBody>) -> ApiResult<QuoteResponse> {
    let (supply_total, discount_total, payable) = s.engine.quote(actor.organization_id, &body.order_ids).await?;
    Ok(Json(QuoteResponse { supply_total, discount_total, payable }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmBody {
    pub order_ids: Vec<Uuid>,
    #[serde(default)]
    pub cash_amount: i64,
    pub sub_account_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub depositor_name: Option<String>,
}

pub async fn confirm(State(s): State<AppState>, actor: Actor, Json(body): Json<ConfirmBody>) -> ApiResult<ConfirmationOutcome> {
    let body = validated(body)?;
    let outcome = s.engine.confirm(ConfirmRequest {
        organization_id: actor.organization_id,
        acting_user: actor.user_id,
        order_ids: body.order_ids,
        cash_amount: body.cash_amount,
        sub_account_id: body.sub_account_id,
        depositor_name: body.depositor_name,
    }).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelBody {
    pub order_ids: Vec<Uuid>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

pub async fn request_cancellation(
    State(s): State<AppState>,
    actor: Actor,
    Json(body): Json<CancelBody>,
) -> ApiResult<CancellationOutcome> {
    let body = validated(body)?;
    Ok(Json(s.engine.request_cancellation(actor.organization_id, &body.order_ids, body.reason).await?))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

pub async fn delete_orders(State(s): State<AppState>, actor: Actor, Json(body): Json<SelectionBody>) -> ApiResult<DeleteResponse> {
    let deleted = s.engine.delete_orders(actor.organization_id, &body.order_ids).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// Accepts the persisted label (`발주서등록`) or its English key (`registered`).
fn parse_status(raw: &str) -> Option<ShippingStatus> {
    let status = match raw.trim() {
        "registered" => ShippingStatus::Registered,
        "confirmed" => ShippingStatus::Confirmed,
        "preparing" => ShippingStatus::Preparing,
        "shipped" => ShippingStatus::Shipped,
        "cancel_requested" => ShippingStatus::CancelRequested,
        "cancelled" => ShippingStatus::Cancelled,
        "refunded" => ShippingStatus::Refunded,
        label => return label.parse().ok(),
    };
    Some(status)
}

pub async fn status_view(State(s): State<AppState>, actor: Actor, Path(raw): Path<String>) -> ApiResult<StatusView> {
    let status = parse_status(&raw).ok_or_else(|| ApiError::BadRequest(format!("unknown shipping status {raw:?}")))?;
    let org = s.engine.organization(actor.organization_id).await?;
    let rate = s.engine.discount_rate_for(&org).await?;
    let orders = s.ports.orders.list_by_status(actor.organization_id, status).await?;
    Ok(Json(build_view(status, orders, rate)))
}
