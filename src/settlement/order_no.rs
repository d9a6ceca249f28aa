//! Seller code resolution and order-number assignment

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::domain::aggregates::SubAccount;
use crate::domain::value_objects::{OrderNo, SellerCode};
use crate::OrderError;

/// Selected sub-account's code, else the main sub-account's, else `S000000`.
pub fn resolve_seller_code(selected: Option<Uuid>, sub_accounts: &[SubAccount]) -> SellerCode {
    let code_of = |sub: &SubAccount| sub.seller_code.clone().and_then(SellerCode::new);
    selected
        .and_then(|id| sub_accounts.iter().find(|s| s.id == id))
        .and_then(code_of)
        .or_else(|| sub_accounts.iter().find(|s| s.is_main).and_then(code_of))
        .unwrap_or_else(SellerCode::fallback)
}

/// Numbers `count` orders 0001.. sharing one organization-local timestamp.
pub fn assign_order_numbers(
    code: &SellerCode,
    confirmed_at: DateTime<Utc>,
    offset: FixedOffset,
    count: usize,
) -> Result<Vec<OrderNo>, OrderError> {
    let stamp = confirmed_at.with_timezone(&offset).naive_local();
    (1..=count)
        .map(|seq| {
            let seq = u32::try_from(seq).unwrap_or(u32::MAX);
            OrderNo::compose(code, stamp, seq).map_err(|e| OrderError::InvalidInput(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sub(code: Option<&str>, is_main: bool) -> SubAccount {
        SubAccount { id: Uuid::new_v4(), seller_code: code.map(Into::into), is_main, ..SubAccount::default() }
    }

    #[test]
    fn test_seller_code_resolution() {
        let main = sub(Some("S100001"), true);
        let other = sub(Some("S200002"), false);
        let blank = sub(Some(" "), false);
        let subs = vec![main.clone(), other.clone(), blank.clone()];

        assert_eq!(resolve_seller_code(Some(other.id), &subs).as_str(), "S200002");
        assert_eq!(resolve_seller_code(None, &subs).as_str(), "S100001");
        assert_eq!(resolve_seller_code(Some(blank.id), &subs).as_str(), "S100001");
        assert_eq!(resolve_seller_code(None, &[other]).as_str(), SellerCode::FALLBACK);
    }

    #[test]
    fn test_numbers_share_local_stamp() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 23, 10, 5).unwrap();
        let code = SellerCode::new("S123456").unwrap();
        let numbers = assign_order_numbers(&code, at, kst, 3).unwrap();
        let raw: Vec<&str> = numbers.iter().map(OrderNo::as_str).collect();
        assert_eq!(raw, vec!["S123456-240305081005-0001", "S123456-240305081005-0002", "S123456-240305081005-0003"]);
    }

    #[test]
    fn test_sequence_limit() {
        let code = SellerCode::fallback();
        assert!(assign_order_numbers(&code, Utc::now(), FixedOffset::east_opt(0).unwrap(), 10_000).is_err());
        assert!(assign_order_numbers(&code, Utc::now(), FixedOffset::east_opt(0).unwrap(), 0).unwrap().is_empty());
    }
}
