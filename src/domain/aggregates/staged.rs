//! Staged (uploaded but unsaved) orders

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Quantity;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Pending,
    Matched,
    Unmatched,
}

/// One row projected from a marketplace export, carried through validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedOrder {
    pub market_name: String,
    pub order_number: String,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address: String,
    pub delivery_message: String,
    pub option_name: String,
    pub quantity: Quantity,
    /// Option name before alias mapping replaced it.
    pub original_option_name: Option<String>,
    pub mapping_applied: bool,
    pub match_status: MatchStatus,
    pub option_code: Option<String>,
    pub unit_price: i64,
    /// Line supply price: unit price × quantity.
    pub supply_price: i64,
    pub modified: bool,
}

impl StagedOrder {
    pub fn is_matched(&self) -> bool { self.match_status == MatchStatus::Matched }

    pub fn mark_matched(&mut self, unit_price: i64, option_code: Option<String>) {
        self.match_status = MatchStatus::Matched;
        self.unit_price = unit_price;
        self.supply_price = unit_price * i64::from(self.quantity.value());
        self.option_code = option_code;
    }

    pub fn mark_unmatched(&mut self) {
        self.match_status = MatchStatus::Unmatched;
        self.unit_price = 0;
        self.supply_price = 0;
        self.option_code = None;
    }
}
