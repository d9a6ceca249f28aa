//! HTTP surface

pub mod handlers;
pub mod sessions;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::ingest::{AgileDecryptor, Decryptor};
use crate::ports::Ports;
use crate::settlement::{OrgClock, SettlementEngine};
use crate::{ErrorBody, OrderError, StoreError};
pub use sessions::{SessionStore, UploadSession};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ports: Ports,
    pub engine: SettlementEngine,
    pub sessions: Arc<SessionStore>,
    pub decryptor: Arc<dyn Decryptor>,
    pub fuzzy_top_n: usize,
}

impl AppState {
    pub fn new(ports: Ports, clock: OrgClock, fuzzy_top_n: usize) -> Self {
        Self {
            engine: SettlementEngine::new(ports.clone(), clock),
            ports,
            sessions: Arc::default(),
            decryptor: Arc::new(AgileDecryptor),
            fuzzy_top_n,
        }
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "order-integration"})) }))
        .route("/api/v1/uploads", post(handlers::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
        .route("/api/v1/uploads/:id", get(handlers::get_session).delete(handlers::discard_session))
        .route("/api/v1/uploads/:id/suggestions", get(handlers::suggestions))
        .route("/api/v1/uploads/:id/corrections", post(handlers::correct))
        .route("/api/v1/uploads/:id/bulk-corrections", post(handlers::bulk_correct))
        .route("/api/v1/uploads/:id/save", post(handlers::save))
        .route("/api/v1/orders", post(handlers::register_order))
        .route("/api/v1/orders/refresh-prices", post(handlers::refresh_prices))
        .route("/api/v1/orders/quote", post(handlers::quote))
        .route("/api/v1/orders/confirm", post(handlers::confirm))
        .route("/api/v1/orders/cancel-requests", post(handlers::request_cancellation))
        .route("/api/v1/orders/delete", post(handlers::delete_orders))
        .route("/api/v1/orders/views/:status", get(handlers::status_view))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Acting seller
// =============================================================================

/// Organization and user the request acts for, from `x-organization-id` / `x-user-id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub organization_id: Uuid,
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts.headers.get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Uuid::parse_str(v.trim()).ok())
                .ok_or(ApiError::Unauthorized(name))
        };
        Ok(Self { organization_id: header("x-organization-id")?, user_id: header("x-user-id")? })
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Order(OrderError),
    Unauthorized(&'static str),
    SessionNotFound(Uuid),
    BadRequest(String),
    Internal(String),
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self { Self::Order(e) }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self { Self::Order(OrderError::Store(e)) }
}

pub fn status_for(e: &OrderError) -> StatusCode {
    match e {
        OrderError::WrongPassword => StatusCode::UNAUTHORIZED,
        OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::UnrecognizedMarket(_)
        | OrderError::UnmatchedOptions { .. }
        | OrderError::IncompleteProfile { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OrderError::InvalidTransition { .. }
        | OrderError::NotDeletable { .. }
        | OrderError::PriceNotRefreshed { .. }
        | OrderError::PartialCommit { .. } => StatusCode::CONFLICT,
        OrderError::EmptySelection
        | OrderError::CashExceedsPayable { .. }
        | OrderError::NegativeCash
        | OrderError::ReasonRequired
        | OrderError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Order(e) => return e.into_response(),
            Self::Unauthorized(header) => {
                (StatusCode::UNAUTHORIZED, ErrorBody::plain("unauthorized", format!("missing or invalid {header} header")))
            }
            Self::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, ErrorBody::plain("session_not_found", format!("upload session {id} not found")))
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorBody::plain("bad_request", message)),
            Self::Internal(message) => {
                tracing::error!(%message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::plain("internal", message))
            }
        };
        (status, Json(body)).into_response()
    }
}
