//! Order Integration Platform
//!
//! Seller-facing order intake and settlement for a multi-vendor marketplace.
//!
//! ## Features
//! - Market-file and standard-template spreadsheet upload (password-protected workbooks included)
//! - Market template detection and field mapping
//! - Option alias mapping, catalog matching and fuzzy correction
//! - Order confirmation with tiered discount and cash allocation
//! - Batch settlement ledger and lifecycle views

pub mod api;
pub mod config;
pub mod detect;
pub mod domain;
pub mod ingest;
pub mod mapping;
pub mod notify;
pub mod ports;
pub mod settlement;
pub mod store;
pub mod validation;
pub mod views;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{ProfileField, ShippingStatus};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Unrecognized market file: {0}")]
    UnrecognizedMarket(String),

    #[error("Incorrect workbook password")]
    WrongPassword,

    #[error("{count} order(s) have unmatched option products")]
    UnmatchedOptions { count: usize },

    #[error("Seller profile is incomplete: {}", missing_labels(.missing))]
    IncompleteProfile { missing: Vec<ProfileField> },

    #[error("No orders selected")]
    EmptySelection,

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Cannot move order {order_id} from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: ShippingStatus,
        to: ShippingStatus,
    },

    #[error("Only registered orders can be deleted")]
    NotDeletable { order_ids: Vec<Uuid> },

    #[error("Prices must be refreshed today before confirmation")]
    PriceNotRefreshed { order_ids: Vec<Uuid> },

    #[error("Cash amount {cash} exceeds payable amount {payable}")]
    CashExceedsPayable { cash: i64, payable: i64 },

    #[error("Cash amount must not be negative")]
    NegativeCash,

    #[error("A cancellation reason is required")]
    ReasonRequired,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Confirmation stopped after {} order(s); order {failed} failed: {reason}", .committed.len())]
    PartialCommit {
        committed: Vec<Uuid>,
        failed: Uuid,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Failure reported by a storage port.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Machine-readable error payload shared by the HTTP layer.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<ProfileField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched: Option<usize>,
}

impl ErrorBody {
    pub fn plain(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), missing_fields: Vec::new(), order_ids: Vec::new(), unmatched: None }
    }
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnrecognizedMarket(_) => "unrecognized_market",
            Self::WrongPassword => "wrong_password",
            Self::UnmatchedOptions { .. } => "unmatched_options",
            Self::IncompleteProfile { .. } => "incomplete_profile",
            Self::EmptySelection => "empty_selection",
            Self::OrderNotFound(_) => "order_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotDeletable { .. } => "not_deletable",
            Self::PriceNotRefreshed { .. } => "price_not_refreshed",
            Self::CashExceedsPayable { .. } => "cash_exceeds_payable",
            Self::NegativeCash => "negative_cash",
            Self::ReasonRequired => "reason_required",
            Self::InvalidInput(_) => "invalid_input",
            Self::PartialCommit { .. } => "partial_commit",
            Self::Store(_) => "store_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let mut body = ErrorBody::plain(self.code(), self.to_string());
        match self {
            Self::IncompleteProfile { missing } => body.missing_fields = missing.clone(),
            Self::UnmatchedOptions { count } => body.unmatched = Some(*count),
            Self::NotDeletable { order_ids } | Self::PriceNotRefreshed { order_ids } => {
                body.order_ids = order_ids.clone();
            }
            Self::PartialCommit { committed, .. } => body.order_ids = committed.clone(),
            _ => {}
        }
        body
    }
}

fn missing_labels(missing: &[ProfileField]) -> String {
    missing.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, OrderError>;
