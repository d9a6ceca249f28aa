//! Discount and cash allocation across the lines of one confirmation.
//!
//! Amounts are whole won. Per-line shares are computed in `i128` so that
//! `share = total * line / supply` is exact before rounding; the last line
//! takes whatever remains, which keeps both sums exact.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::DiscountRate;
use crate::OrderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineAllocation {
    pub product_amount: i64,
    pub discount: i64,
    pub cash: i64,
    pub final_deposit: i64,
}

/// `floor(floor(supply * rate / 100) / 10) * 10`; zero for an empty or negative supply.
pub fn total_discount(total_supply: i64, rate: DiscountRate) -> i64 {
    if total_supply <= 0 || rate.is_zero() { return 0; }
    let raw = (Decimal::from(total_supply) * rate.percent() / Decimal::ONE_HUNDRED).floor();
    let truncated = (raw / Decimal::TEN).floor() * Decimal::TEN;
    truncated.to_i64().unwrap_or(0)
}

/// Largest cash amount a confirmation of `total_supply` may apply.
pub fn payable(total_supply: i64, rate: DiscountRate) -> i64 {
    (total_supply - total_discount(total_supply, rate)).max(0)
}

/// Splits the batch discount and `cash` over `product_amounts` proportionally.
///
/// Discount shares are truncated to multiples of 10, cash shares rounded half
/// away from zero and capped at the cash still unassigned. The last line takes
/// the remainder of each.
pub fn allocate(product_amounts: &[i64], rate: DiscountRate, cash: i64) -> Result<Vec<LineAllocation>, OrderError> {
    if cash < 0 { return Err(OrderError::NegativeCash); }
    let total_supply: i64 = product_amounts.iter().sum();
    let max_cash = payable(total_supply, rate);
    if cash > max_cash { return Err(OrderError::CashExceedsPayable { cash, payable: max_cash }); }

    let discount_total = total_discount(total_supply, rate);
    let last = product_amounts.len().saturating_sub(1);
    let mut discount_left = discount_total;
    let mut cash_left = cash;

    let lines = product_amounts.iter().enumerate().map(|(i, &amount)| {
        let (discount, line_cash) = if total_supply <= 0 {
            (0, 0)
        } else if i == last {
            (discount_left, cash_left)
        } else {
            let weight = i128::from(amount.max(0));
            let supply = i128::from(total_supply);
            let discount = (i128::from(discount_total) * weight / supply) / 10 * 10;
            let line_cash = (2 * i128::from(cash) * weight + supply) / (2 * supply);
            (discount as i64, (line_cash as i64).min(cash_left))
        };
        discount_left -= discount;
        cash_left -= line_cash;
        LineAllocation { product_amount: amount, discount, cash: line_cash, final_deposit: amount - discount - line_cash }
    }).collect();
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rate(percent: i64) -> DiscountRate { DiscountRate::new(Decimal::from(percent)).unwrap() }

    #[test]
    fn test_three_line_example() {
        let lines = allocate(&[10000, 20000, 30000], rate(10), 333).unwrap();
        assert_eq!(lines.iter().map(|l| l.discount).collect::<Vec<_>>(), vec![1000, 2000, 3000]);
        assert_eq!(lines.iter().map(|l| l.cash).collect::<Vec<_>>(), vec![56, 111, 166]);
        assert_eq!(lines.iter().map(|l| l.cash).sum::<i64>(), 333);
        assert_eq!(lines[0].final_deposit, 10000 - 1000 - 56);
    }

    #[test]
    fn test_total_discount_truncates_to_tens() {
        assert_eq!(total_discount(60000, rate(10)), 6000);
        assert_eq!(total_discount(12345, rate(3)), 370);
        assert_eq!(total_discount(99, rate(10)), 0);
        assert_eq!(total_discount(10001, DiscountRate::new(Decimal::new(25, 1)).unwrap()), 250);
        assert_eq!(total_discount(0, rate(50)), 0);
    }

    #[test]
    fn test_last_line_absorbs_discount_remainder() {
        let lines = allocate(&[3333, 3333, 3334], rate(10), 0).unwrap();
        assert_eq!(lines.iter().map(|l| l.discount).collect::<Vec<_>>(), vec![330, 330, 340]);
    }

    #[test]
    fn test_zero_supply_allocates_nothing() {
        let lines = allocate(&[0, 0], rate(10), 0).unwrap();
        assert!(lines.iter().all(|l| l.discount == 0 && l.cash == 0 && l.final_deposit == 0));
        assert!(matches!(allocate(&[0, 0], rate(10), 1), Err(OrderError::CashExceedsPayable { cash: 1, payable: 0 })));
    }

    #[test]
    fn test_cash_bounds() {
        assert!(matches!(allocate(&[1000], rate(0), -1), Err(OrderError::NegativeCash)));
        assert!(matches!(allocate(&[1000], rate(10), 901), Err(OrderError::CashExceedsPayable { cash: 901, payable: 900 })));
        assert_eq!(allocate(&[1000], rate(10), 900).unwrap()[0].final_deposit, 0);
    }

    #[test]
    fn test_cash_share_never_overshoots() {
        // Rounding 0.5 up on both early lines would exceed the cash available.
        let lines = allocate(&[1, 1, 0], rate(0), 1).unwrap();
        assert_eq!(lines.iter().map(|l| l.cash).collect::<Vec<_>>(), vec![1, 0, 0]);
    }

    proptest! {
        #[test]
        fn sums_are_conserved(
            amounts in prop::collection::vec(0i64..5_000_000, 1..25),
            tenths in 0i64..=1000,
            cash_ratio in 0.0f64..=1.0,
        ) {
            let rate = DiscountRate::new(Decimal::new(tenths, 1)).unwrap();
            let supply: i64 = amounts.iter().sum();
            let cash = (payable(supply, rate) as f64 * cash_ratio).floor() as i64;
            let lines = allocate(&amounts, rate, cash).unwrap();

            prop_assert_eq!(lines.iter().map(|l| l.discount).sum::<i64>(), total_discount(supply, rate));
            prop_assert_eq!(lines.iter().map(|l| l.cash).sum::<i64>(), cash);
            for l in &lines {
                prop_assert_eq!(l.final_deposit, l.product_amount - l.discount - l.cash);
                prop_assert!(l.discount >= 0 && l.cash >= 0);
            }
            for l in &lines[..lines.len() - 1] {
                prop_assert_eq!(l.discount % 10, 0);
            }
        }
    }
}
