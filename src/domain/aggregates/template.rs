//! Market template configuration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Internal order-record fields a template maps source columns onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalField {
    OrderNumber,
    BuyerName,
    BuyerPhone,
    RecipientName,
    RecipientPhone,
    RecipientAddress,
    DeliveryMessage,
    OptionName,
    Quantity,
}

impl InternalField {
    pub const ALL: [InternalField; 9] = [
        Self::OrderNumber, Self::BuyerName, Self::BuyerPhone, Self::RecipientName, Self::RecipientPhone,
        Self::RecipientAddress, Self::DeliveryMessage, Self::OptionName, Self::Quantity,
    ];

    /// Column key in the legacy `field_N` configuration rows.
    pub fn legacy_key(&self) -> &'static str {
        match self {
            Self::OrderNumber => "field_4",
            Self::BuyerName => "field_5",
            Self::BuyerPhone => "field_6",
            Self::RecipientName => "field_7",
            Self::RecipientPhone => "field_8",
            Self::RecipientAddress => "field_9",
            Self::DeliveryMessage => "field_10",
            Self::OptionName => "field_11",
            Self::Quantity => "field_12",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            Self::OrderNumber => "order_number",
            Self::BuyerName => "buyer_name",
            Self::BuyerPhone => "buyer_phone",
            Self::RecipientName => "recipient_name",
            Self::RecipientPhone => "recipient_phone",
            Self::RecipientAddress => "recipient_address",
            Self::DeliveryMessage => "delivery_message",
            Self::OptionName => "option_name",
            Self::Quantity => "quantity",
        }
    }

    /// Column header used by the platform's standard upload form.
    pub fn standard_header(&self) -> &'static str {
        match self {
            Self::OrderNumber => "주문번호",
            Self::BuyerName => "주문자",
            Self::BuyerPhone => "주문자전화번호",
            Self::RecipientName => "수령인",
            Self::RecipientPhone => "수령인전화번호",
            Self::RecipientAddress => "주소",
            Self::DeliveryMessage => "배송메세지",
            Self::OptionName => "옵션명",
            Self::Quantity => "수량",
        }
    }

    fn from_config_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.iter().copied().find(|f| f.legacy_key() == key || f.english_name() == key)
    }
}

impl fmt::Display for InternalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.english_name()) }
}

/// Candidate source column names per internal field, tried in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping(BTreeMap<InternalField, Vec<String>>);

impl FieldMapping {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, field: InternalField, candidates: &str) -> Self {
        self.set(field, candidates);
        self
    }

    /// Sets candidates from a comma-separated column list. Blank entries are dropped.
    pub fn set(&mut self, field: InternalField, candidates: &str) {
        let list: Vec<String> = candidates.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect();
        if list.is_empty() { self.0.remove(&field); } else { self.0.insert(field, list); }
    }

    pub fn candidates(&self, field: InternalField) -> &[String] {
        self.0.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Builds a mapping from configuration rows keyed by `field_N` or English field names.
    pub fn from_config(columns: &HashMap<String, String>) -> Self {
        let mut mapping = Self::new();
        for (key, value) in columns {
            if let Some(field) = InternalField::from_config_key(key) { mapping.set(field, value); }
        }
        mapping
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// One supported marketplace export format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTemplate {
    pub market_name: String,
    pub initial: Option<String>,
    pub color_rgb: Option<String>,
    /// Comma-separated filename tokens.
    pub detect_string1: String,
    /// Comma-separated header tokens.
    pub detect_string2: String,
    /// 1-based index of the header row.
    pub header_row: u32,
    pub settlement_formula: Option<String>,
    pub display_order: i32,
    pub field_mappings: FieldMapping,
}

impl MarketTemplate {
    pub const STANDARD_MARKET: &'static str = "표준양식";

    /// The platform's own upload form. Never detected; chosen explicitly by the uploader.
    pub fn standard() -> Self {
        let mut mapping = FieldMapping::new();
        for field in InternalField::ALL { mapping.set(field, field.standard_header()); }
        Self {
            market_name: Self::STANDARD_MARKET.to_string(), initial: Some("표".into()), color_rgb: None,
            detect_string1: String::new(), detect_string2: String::new(), header_row: 1,
            settlement_formula: None, display_order: 0, field_mappings: mapping,
        }
    }

    /// 0-based header row index; a configured 0 is treated as the first row.
    pub fn header_index(&self) -> usize { self.header_row.max(1) as usize - 1 }

    pub fn filename_tokens(&self) -> Vec<String> { tokens(&self.detect_string1) }
    pub fn header_tokens(&self) -> Vec<String> { tokens(&self.detect_string2) }
}

fn tokens(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_split_and_trimmed() {
        let m = FieldMapping::new().with(InternalField::OptionName, "옵션정보, 상품옵션 ,,");
        assert_eq!(m.candidates(InternalField::OptionName), ["옵션정보", "상품옵션"]);
        assert!(m.candidates(InternalField::Quantity).is_empty());
    }

    #[test]
    fn test_from_config_accepts_both_key_styles() {
        let mut cols = HashMap::new();
        cols.insert("field_4".to_string(), "주문번호".to_string());
        cols.insert("quantity".to_string(), "수량".to_string());
        cols.insert("field_30".to_string(), "정산예정금액".to_string());
        let m = FieldMapping::from_config(&cols);
        assert_eq!(m.candidates(InternalField::OrderNumber), ["주문번호"]);
        assert_eq!(m.candidates(InternalField::Quantity), ["수량"]);
    }

    #[test]
    fn test_standard_template() {
        let t = MarketTemplate::standard();
        assert_eq!(t.header_index(), 0);
        assert_eq!(t.field_mappings.candidates(InternalField::RecipientName), ["수령인"]);
        assert!(t.filename_tokens().is_empty());
    }
}
