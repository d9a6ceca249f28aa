//! Value Objects for order integration

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lookup key for option product names: trimmed and case-folded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionKey(String);

impl OptionKey {
    pub fn new(raw: &str) -> Self { Self(raw.trim().to_lowercase()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Seller code that prefixes every generated order number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerCode(String);

impl SellerCode {
    pub const FALLBACK: &'static str = "S000000";

    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() { None } else { Some(Self(value)) }
    }
    pub fn fallback() -> Self { Self(Self::FALLBACK.to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SellerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// System order number: `{sellerCode}-{YYMMDDHHMMSS}-{seq4}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNo(String);

impl OrderNo {
    pub const STAMP_FORMAT: &'static str = "%y%m%d%H%M%S";

    pub fn compose(code: &SellerCode, local_stamp: NaiveDateTime, seq: u32) -> Result<Self, OrderNoError> {
        if seq == 0 || seq > 9999 { return Err(OrderNoError::SequenceOutOfRange(seq)); }
        Ok(Self(format!("{}-{}-{:04}", code, local_stamp.format(Self::STAMP_FORMAT), seq)))
    }

    pub fn parse(value: &str) -> Result<Self, OrderNoError> {
        let mut parts = value.rsplitn(3, '-');
        let seq = parts.next().ok_or(OrderNoError::Malformed)?;
        let stamp = parts.next().ok_or(OrderNoError::Malformed)?;
        let code = parts.next().ok_or(OrderNoError::Malformed)?;
        if code.is_empty() || seq.len() != 4 || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNoError::Malformed);
        }
        NaiveDateTime::parse_from_str(stamp, Self::STAMP_FORMAT).map_err(|_| OrderNoError::Malformed)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn sequence(&self) -> u32 { self.0.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0) }
}

impl fmt::Display for OrderNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderNoError { Malformed, SequenceOutOfRange(u32) }
impl std::error::Error for OrderNoError {}
impl fmt::Display for OrderNoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed order number"),
            Self::SequenceOutOfRange(seq) => write!(f, "Order sequence {seq} outside 1..=9999"),
        }
    }
}

/// Tier discount rate in percent (0..=100).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct DiscountRate(Decimal);

impl DiscountRate {
    pub fn new(percent: Decimal) -> Result<Self, DiscountRateError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED { return Err(DiscountRateError::OutOfRange(percent)); }
        Ok(Self(percent))
    }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn percent(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
}

impl Default for DiscountRate { fn default() -> Self { Self::zero() } }

#[derive(Debug, Clone)] pub enum DiscountRateError { OutOfRange(Decimal) }
impl std::error::Error for DiscountRateError {}
impl fmt::Display for DiscountRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange(p) => write!(f, "Discount rate {p}% outside 0..=100") }
    }
}

/// Ordered quantity; spreadsheet cells that are empty or non-numeric count as 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32")]
pub struct Quantity(u32);

impl From<u32> for Quantity {
    fn from(value: u32) -> Self { Self::new(value) }
}

impl Quantity {
    /// Largest quantity a persisted order line can hold (`INTEGER` column).
    pub const MAX: u32 = i32::MAX as u32;

    pub fn new(value: u32) -> Self { Self(value.clamp(1, Self::MAX)) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn as_i32(&self) -> i32 { i32::try_from(self.0).unwrap_or(i32::MAX) }

    pub fn from_cell(raw: &str) -> Self {
        let raw = raw.trim().replace(',', "");
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 1.0 => Self(v.trunc().min(f64::from(Self::MAX)) as u32),
            _ => Self(1),
        }
    }
}

impl Default for Quantity { fn default() -> Self { Self(1) } }
