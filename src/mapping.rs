//! Field mapping: marketplace rows → staged order records.

use std::collections::HashMap;

use crate::domain::aggregates::{InternalField, MarketTemplate, StagedOrder};
use crate::domain::value_objects::Quantity;

/// A sheet as rows of trimmed cell text.
pub type Grid = Vec<Vec<String>>;

/// Projects every data row below the template's header row onto a [`StagedOrder`].
///
/// Rows with no order number, no recipient and no option name are dropped.
/// The result depends only on `(template, grid)`.
pub fn map_rows(template: &MarketTemplate, grid: &Grid) -> Vec<StagedOrder> {
    let header_idx = template.header_index();
    let Some(header) = grid.get(header_idx) else {
        return Vec::new();
    };

    // First occurrence wins on duplicate headers.
    let mut columns: HashMap<&str, usize> = HashMap::new();
    for (idx, name) in header.iter().enumerate() {
        let name = name.trim();
        if !name.is_empty() { columns.entry(name).or_insert(idx); }
    }

    grid.iter()
        .skip(header_idx + 1)
        .filter_map(|row| {
            let resolve = |field: InternalField| resolve_field(template, &columns, row, field);
            let order = StagedOrder {
                market_name: template.market_name.clone(),
                order_number: resolve(InternalField::OrderNumber),
                buyer_name: resolve(InternalField::BuyerName),
                buyer_phone: resolve(InternalField::BuyerPhone),
                recipient_name: resolve(InternalField::RecipientName),
                recipient_phone: resolve(InternalField::RecipientPhone),
                address: resolve(InternalField::RecipientAddress),
                delivery_message: resolve(InternalField::DeliveryMessage),
                option_name: resolve(InternalField::OptionName),
                quantity: Quantity::from_cell(&resolve(InternalField::Quantity)),
                ..StagedOrder::default()
            };
            let empty = order.order_number.is_empty() && order.recipient_name.is_empty() && order.option_name.is_empty();
            (!empty).then_some(order)
        })
        .collect()
}

/// First candidate column with a non-empty value, or an empty string.
fn resolve_field(template: &MarketTemplate, columns: &HashMap<&str, usize>, row: &[String], field: InternalField) -> String {
    template.field_mappings.candidates(field).iter()
        .filter_map(|candidate| columns.get(candidate.as_str()))
        .filter_map(|&idx| row.get(idx))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::FieldMapping;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    fn market(header_row: u32) -> MarketTemplate {
        MarketTemplate {
            market_name: "스마트스토어".into(), initial: None, color_rgb: None,
            detect_string1: "스마트스토어".into(), detect_string2: String::new(), header_row,
            settlement_formula: None, display_order: 1,
            field_mappings: FieldMapping::new()
                .with(InternalField::OrderNumber, "상품주문번호")
                .with(InternalField::RecipientName, "수취인명")
                .with(InternalField::OptionName, "옵션정보,상품명")
                .with(InternalField::Quantity, "수량"),
        }
    }

    #[test]
    fn test_maps_rows_below_header() {
        let g = grid(&[
            &["주문 목록"],
            &["상품주문번호", "수취인명", "상품명", "옵션정보", "수량"],
            &["1001", "이영희", "사과", "빨강-5kg", "2"],
            &["1002", "박민수", "배", "", ""],
        ]);
        let orders = map_rows(&market(2), &g);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].option_name, "빨강-5kg");
        assert_eq!(orders[0].quantity.value(), 2);
        // Falls back to the second candidate when the first is blank.
        assert_eq!(orders[1].option_name, "배");
        assert_eq!(orders[1].quantity.value(), 1);
        assert_eq!(orders[1].market_name, "스마트스토어");
    }

    #[test]
    fn test_drops_rows_without_key_fields() {
        let g = grid(&[
            &["상품주문번호", "수취인명", "옵션정보"],
            &["", "", ""],
            &["", "", "  "],
            &["", "김하나", ""],
        ]);
        let orders = map_rows(&market(1), &g);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].recipient_name, "김하나");
    }

    #[test]
    fn test_missing_columns_default_to_empty() {
        let g = grid(&[&["상품주문번호"], &["77"]]);
        let orders = map_rows(&market(1), &g);
        assert_eq!(orders[0].order_number, "77");
        assert_eq!(orders[0].buyer_name, "");
        assert_eq!(orders[0].option_name, "");
    }

    #[test]
    fn test_header_beyond_grid() {
        assert!(map_rows(&market(5), &grid(&[&["a"]])).is_empty());
    }

    #[test]
    fn test_standard_template_rows() {
        let g = grid(&[
            &["주문번호", "주문자", "주문자전화번호", "수령인", "수령인전화번호", "주소", "배송메세지", "옵션명", "수량"],
            &["A-1", "김철수", "010", "이영희", "011", "서울", "문앞", "블랙-XL", "3"],
        ]);
        let orders = map_rows(&MarketTemplate::standard(), &g);
        assert_eq!(orders[0].delivery_message, "문앞");
        assert_eq!(orders[0].quantity.value(), 3);
    }
}
