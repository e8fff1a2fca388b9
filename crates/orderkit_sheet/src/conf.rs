//! Colors, layout constants and variant presets.

use std::collections::BTreeMap;

use crate::spec::{
    EnumDedupKeyRule, EnumGroupRule, EnumLayoutRule, EnumSheetVariant, EnumSummaryOrder,
    SpecTransformOptions,
};

/// Separator row fill.
pub const C_COLOR_SEPARATOR: &str = "#E0E0E0";
/// Quantity threshold ("attention") fill.
pub const C_COLOR_ATTENTION: &str = "#FFC0CB";
/// Rotating fills for duplicate recipients, assigned in first-seen order.
pub const TUP_COLORS_DUPLICATE: [&str; 6] = [
    "#FFF2CC", "#DDEBF7", "#E2EFDA", "#FCE4D6", "#EDE1F5", "#D9F2F2",
];

/// Minimum column span of a separator fill.
pub const N_WIDTH_ROW_FILL_MIN: usize = 50;
pub const N_HEIGHT_SEPARATOR: f64 = 6.0;
pub const N_HEIGHT_SUMMARY: f64 = 25.0;
pub const N_THRESHOLD_QUANTITY: f64 = 2.0;
pub const N_ROWS_SUMMARY_GAP: usize = 1;

/// Output name when the upload name has no 8-digit run.
pub const C_FILENAME_FALLBACK: &str = "processed_excel.xlsx";

/// Fixed widths of the "결과" sheet (A, C, D, E, F, H, I, K).
pub fn derive_result_column_widths() -> BTreeMap<usize, f64> {
    BTreeMap::from([
        (0, 12.0),
        (2, 73.0),
        (3, 5.0),
        (4, 25.0),
        (5, 25.0),
        (7, 7.0),
        (8, 25.0),
        (10, 80.0),
    ])
}

/// Column projection of the "양식" sheet.
pub fn derive_form_projection() -> Vec<(usize, String)> {
    ["주문번호", "수취인명", "연락처", "상품명", "수량", "주소", "배송메세지"]
        .iter()
        .enumerate()
        .map(|(n_idx, c_name)| (n_idx, c_name.to_string()))
        .collect()
}

/// Build the preset options of `variant`.
pub fn derive_variant_options(variant: EnumSheetVariant) -> SpecTransformOptions {
    match variant {
        EnumSheetVariant::Result => SpecTransformOptions {
            variant,
            sheet_name: variant.label().to_string(),
            n_rows_skip: 0,
            cols_projection: vec![],
            rule_layout: EnumLayoutRule::Flat,
            rule_group: EnumGroupRule::Keyed,
            col_recipient: 1,
            col_product: 2,
            col_quantity: 3,
            col_phone: None,
            cols_threshold: vec![3, 7],
            n_threshold: N_THRESHOLD_QUANTITY,
            rule_dedup: None,
            rule_summary_order: EnumSummaryOrder::FirstSeen,
            n_rows_summary_gap: N_ROWS_SUMMARY_GAP,
            widths_by_col: derive_result_column_widths(),
            height_separator: N_HEIGHT_SEPARATOR,
            height_summary: N_HEIGHT_SUMMARY,
            if_freeze_header: false,
        },
        EnumSheetVariant::Form => SpecTransformOptions {
            variant,
            sheet_name: variant.label().to_string(),
            n_rows_skip: 1,
            cols_projection: derive_form_projection(),
            rule_layout: EnumLayoutRule::Grouped,
            rule_group: EnumGroupRule::Keyed,
            col_recipient: 1,
            col_product: 3,
            col_quantity: 4,
            col_phone: Some(2),
            cols_threshold: vec![4],
            n_threshold: N_THRESHOLD_QUANTITY,
            rule_dedup: Some(EnumDedupKeyRule::RecipientPhone),
            rule_summary_order: EnumSummaryOrder::FirstSeen,
            n_rows_summary_gap: N_ROWS_SUMMARY_GAP,
            widths_by_col: BTreeMap::from([(0, 14.0), (3, 60.0), (5, 50.0), (6, 30.0)]),
            height_separator: N_HEIGHT_SEPARATOR,
            height_summary: N_HEIGHT_SUMMARY,
            if_freeze_header: true,
        },
    }
}
