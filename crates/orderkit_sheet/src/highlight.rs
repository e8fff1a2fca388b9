//! Quantity-threshold and duplicate-recipient highlight plans.
//!
//! Both planners read the emitted grid and only look at `Data` rows; their
//! output is keyed by grid row index so the style planner can overlay it
//! without re-deriving positions.

use std::collections::{BTreeMap, HashMap};

use orderkit_io_xlsx::{
    EnumSheetRowKind, SpecCellFormat, SpecSheetGrid, SpecSheetRow, derive_cell_text, is_blank,
    parse_number,
};

use crate::conf::{C_COLOR_ATTENTION, TUP_COLORS_DUPLICATE};
use crate::spec::EnumDedupKeyRule;

fn derive_row_key_text(row: &SpecSheetRow, col: usize) -> String {
    derive_cell_text(row.cell(col)).trim().to_string()
}

////////////////////////////////////////////////////////////////////////////////
// #region ThresholdHighlight

/// Plan per-cell overlays for the quantity threshold rule.
///
/// Only data rows with a non-blank recipient qualify. Inside them, a
/// non-blank cell of a threshold column is centered, and a cell whose number
/// is `>= n_threshold` also gets the attention fill. Unparseable text is left
/// unfilled.
pub fn plan_threshold_highlights(
    grid: &SpecSheetGrid,
    col_recipient: usize,
    cols_threshold: &[usize],
    n_threshold: f64,
) -> BTreeMap<(usize, usize), SpecCellFormat> {
    let mut dict_fmts = BTreeMap::new();

    for (n_idx_row, row) in grid.rows.iter().enumerate() {
        if row.kind != EnumSheetRowKind::Data || is_blank(row.cell(col_recipient)) {
            continue;
        }
        for &n_idx_col in cols_threshold {
            let value = row.cell(n_idx_col);
            if is_blank(value) {
                continue;
            }
            let mut fmt = SpecCellFormat {
                align: Some("center".to_string()),
                ..Default::default()
            };
            if let Some(n_value) = parse_number(value)
                && n_value >= n_threshold
            {
                fmt.bg_color = Some(C_COLOR_ATTENTION.to_string());
            }
            dict_fmts.insert((n_idx_row, n_idx_col), fmt);
        }
    }

    dict_fmts
}

/// Count overlays carrying the attention fill.
pub fn count_threshold_hits(fmts: &BTreeMap<(usize, usize), SpecCellFormat>) -> usize {
    fmts.values().filter(|fmt| fmt.bg_color.is_some()).count()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DuplicateHighlight

fn derive_dedup_key(
    row: &SpecSheetRow,
    col_recipient: usize,
    col_phone: Option<usize>,
    rule: EnumDedupKeyRule,
) -> Option<String> {
    let c_recipient = derive_row_key_text(row, col_recipient);
    if c_recipient.is_empty() {
        return None;
    }
    match (rule, col_phone) {
        (EnumDedupKeyRule::RecipientPhone, Some(n_idx_phone)) => Some(format!(
            "{c_recipient}\u{1f}{}",
            derive_row_key_text(row, n_idx_phone)
        )),
        _ => Some(c_recipient),
    }
}

/// Plan a fill color per data row whose dedup key occurs more than once.
///
/// Colors rotate through [`TUP_COLORS_DUPLICATE`] in the order duplicate keys
/// are first seen; all rows sharing a key get the same color.
pub fn plan_duplicate_highlights(
    grid: &SpecSheetGrid,
    col_recipient: usize,
    col_phone: Option<usize>,
    rule: EnumDedupKeyRule,
) -> BTreeMap<usize, String> {
    let l_keys: Vec<(usize, String)> = grid
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.kind == EnumSheetRowKind::Data)
        .filter_map(|(n_idx_row, row)| {
            derive_dedup_key(row, col_recipient, col_phone, rule).map(|c_key| (n_idx_row, c_key))
        })
        .collect();

    let mut dict_counts: HashMap<&str, usize> = HashMap::new();
    for (_, c_key) in &l_keys {
        *dict_counts.entry(c_key.as_str()).or_default() += 1;
    }

    let mut dict_color_by_key: HashMap<&str, &'static str> = HashMap::new();
    let mut dict_colors = BTreeMap::new();
    for (n_idx_row, c_key) in &l_keys {
        if dict_counts.get(c_key.as_str()).copied().unwrap_or(0) < 2 {
            continue;
        }
        let n_seen = dict_color_by_key.len();
        let c_color = *dict_color_by_key
            .entry(c_key.as_str())
            .or_insert(TUP_COLORS_DUPLICATE[n_seen % TUP_COLORS_DUPLICATE.len()]);
        dict_colors.insert(*n_idx_row, c_color.to_string());
    }

    dict_colors
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use orderkit_io_xlsx::EnumCellValue;
    use proptest::prelude::*;

    use super::*;

    fn text(s: &str) -> EnumCellValue {
        if s.is_empty() {
            EnumCellValue::None
        } else {
            EnumCellValue::String(s.to_string())
        }
    }

    fn build_data_row(recipient: &str, phone: &str, qty: EnumCellValue) -> SpecSheetRow {
        SpecSheetRow {
            kind: EnumSheetRowKind::Data,
            cells: vec![text(recipient), text(phone), qty],
            idx_source: Some(0),
        }
    }

    #[test]
    fn test_threshold_highlights_numeric_text_and_skips_garbage() {
        let grid = SpecSheetGrid {
            rows: vec![
                SpecSheetRow {
                    kind: EnumSheetRowKind::Header,
                    cells: vec![text("name"), text("phone"), text("9")],
                    idx_source: None,
                },
                build_data_row("Kim", "", text("2")),
                build_data_row("Kim", "", text("abc")),
                build_data_row("Lee", "", EnumCellValue::Number(1.0)),
                build_data_row("", "", EnumCellValue::Number(5.0)),
                SpecSheetRow::marker(EnumSheetRowKind::Separator),
            ],
        };

        let dict_fmts = plan_threshold_highlights(&grid, 0, &[2], 2.0);

        assert_eq!(
            dict_fmts.get(&(1, 2)).and_then(|fmt| fmt.bg_color.as_deref()),
            Some(C_COLOR_ATTENTION)
        );
        let fmt_garbage = dict_fmts.get(&(2, 2)).unwrap();
        assert_eq!(fmt_garbage.bg_color, None);
        assert_eq!(fmt_garbage.align.as_deref(), Some("center"));
        assert_eq!(dict_fmts.get(&(3, 2)).unwrap().bg_color, None);
        assert!(!dict_fmts.contains_key(&(0, 2)));
        assert!(!dict_fmts.contains_key(&(4, 2)));
        assert_eq!(count_threshold_hits(&dict_fmts), 1);
    }

    #[test]
    fn test_duplicate_highlights_color_repeated_keys_only() {
        let grid = SpecSheetGrid {
            rows: vec![
                build_data_row("Kim", "010", EnumCellValue::None),
                build_data_row("Lee", "011", EnumCellValue::None),
                SpecSheetRow::marker(EnumSheetRowKind::Separator),
                build_data_row(" Kim ", "010", EnumCellValue::None),
                build_data_row("Kim", "999", EnumCellValue::None),
                build_data_row("", "010", EnumCellValue::None),
                build_data_row("", "010", EnumCellValue::None),
            ],
        };

        let dict_by_recipient =
            plan_duplicate_highlights(&grid, 0, Some(1), EnumDedupKeyRule::Recipient);
        assert_eq!(
            dict_by_recipient,
            BTreeMap::from([
                (0, TUP_COLORS_DUPLICATE[0].to_string()),
                (3, TUP_COLORS_DUPLICATE[0].to_string()),
                (4, TUP_COLORS_DUPLICATE[0].to_string()),
            ])
        );

        let dict_by_phone =
            plan_duplicate_highlights(&grid, 0, Some(1), EnumDedupKeyRule::RecipientPhone);
        assert_eq!(
            dict_by_phone,
            BTreeMap::from([
                (0, TUP_COLORS_DUPLICATE[0].to_string()),
                (3, TUP_COLORS_DUPLICATE[0].to_string()),
            ])
        );
    }

    #[test]
    fn test_duplicate_palette_rotates_in_first_seen_order() {
        let l_names = ["A", "B", "C", "D", "E", "F", "G"];
        let mut l_rows = Vec::new();
        for _ in 0..2 {
            for c_name in l_names {
                l_rows.push(build_data_row(c_name, "", EnumCellValue::None));
            }
        }
        let grid = SpecSheetGrid { rows: l_rows };

        let dict_colors = plan_duplicate_highlights(&grid, 0, None, EnumDedupKeyRule::Recipient);
        assert_eq!(dict_colors[&1], TUP_COLORS_DUPLICATE[1]);
        assert_eq!(dict_colors[&6], TUP_COLORS_DUPLICATE[0]);
        assert_eq!(dict_colors[&13], TUP_COLORS_DUPLICATE[0]);
    }

    proptest! {
        #[test]
        fn prop_rows_sharing_a_key_share_a_color(
            l_names in prop::collection::vec(
                prop::sample::select(vec!["", "Kim", "Lee", "Park", "Choi"]),
                0..40,
            )
        ) {
            let grid = SpecSheetGrid {
                rows: l_names
                    .iter()
                    .map(|c_name| build_data_row(c_name, "", EnumCellValue::None))
                    .collect(),
            };
            let dict_colors = plan_duplicate_highlights(&grid, 0, None, EnumDedupKeyRule::Recipient);

            let mut dict_seen: HashMap<&str, &String> = HashMap::new();
            for (n_idx_row, c_color) in &dict_colors {
                let c_name = l_names[*n_idx_row];
                prop_assert!(!c_name.is_empty());
                prop_assert!(l_names.iter().filter(|name| **name == c_name).count() > 1);
                if let Some(c_prev) = dict_seen.insert(c_name, c_color) {
                    prop_assert_eq!(c_prev, c_color);
                }
            }
        }
    }
}
