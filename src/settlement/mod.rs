//! Order confirmation & settlement
//!
//! Price refresh, confirmation (allocation, order numbers, claim-guarded row
//! updates, batch ledger, cash debit), cancellation requests and deletion,
//! plus registration of single hand-entered orders.

pub mod allocation;
pub mod cancel;
pub mod engine;
pub mod manual;
pub mod order_no;
pub mod price_refresh;

pub use allocation::{allocate, payable, total_discount, LineAllocation};
pub use cancel::CancellationOutcome;
pub use engine::{ConfirmRequest, ConfirmationOutcome, ConfirmationWarning, ConfirmedLine, SettlementEngine};
pub use manual::{format_phone, ManualOrder, MANUAL_MARKET};
pub use order_no::{assign_order_numbers, resolve_seller_code};
pub use price_refresh::PriceRefreshReport;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Organization-local time. Order-number stamps and the same-day price gate use it.
#[derive(Clone, Copy, Debug)]
pub struct OrgClock {
    offset: FixedOffset,
    pinned: Option<DateTime<Utc>>,
}

impl OrgClock {
    pub fn new(offset: FixedOffset) -> Self { Self { offset, pinned: None } }

    pub fn from_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::new)
    }

    /// A clock that always reads `at`.
    pub fn pinned_at(mut self, at: DateTime<Utc>) -> Self {
        self.pinned = Some(at);
        self
    }

    pub fn offset(&self) -> FixedOffset { self.offset }
    pub fn now(&self) -> DateTime<Utc> { self.pinned.unwrap_or_else(Utc::now) }
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate { at.with_timezone(&self.offset).date_naive() }
}

impl Default for OrgClock {
    /// Korea Standard Time (UTC+9).
    fn default() -> Self { Self::from_hours(9).unwrap_or_else(|| Self::new(Utc.fix())) }
}
