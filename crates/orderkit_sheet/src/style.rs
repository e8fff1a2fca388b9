//! Style planning over the emitted grid.

use std::collections::BTreeMap;

use orderkit_io_xlsx::conf::derive_default_xlsx_formats;
use orderkit_io_xlsx::{EnumSheetRowKind, SpecCellFormat, SpecSheetGrid, SpecSheetStyle};

use crate::conf::{C_COLOR_SEPARATOR, N_WIDTH_ROW_FILL_MIN};
use crate::spec::{EnumDedupKeyRule, SpecTransformOptions};

/// Build the declarative style plan of `grid`.
///
/// Overlay order per data cell is duplicate fill, then threshold overlay, so
/// the attention fill wins where both apply.
pub fn plan_sheet_style(
    grid: &SpecSheetGrid,
    options: &SpecTransformOptions,
    fmts_threshold: &BTreeMap<(usize, usize), SpecCellFormat>,
    colors_duplicate: &BTreeMap<usize, String>,
) -> SpecSheetStyle {
    let dict_fmts_default = derive_default_xlsx_formats();
    let mut style = SpecSheetStyle {
        fmt_base: dict_fmts_default.get("text").cloned().unwrap_or_default(),
        fmt_header: dict_fmts_default.get("header").cloned().unwrap_or_default(),
        width_row_fill: usize::max(grid.width(), N_WIDTH_ROW_FILL_MIN),
        widths_by_col: options.widths_by_col.clone(),
        ..Default::default()
    };

    let fmt_separator = SpecCellFormat {
        bg_color: Some(C_COLOR_SEPARATOR.to_string()),
        ..Default::default()
    };
    let fmt_summary = SpecCellFormat {
        border: Some(1),
        ..Default::default()
    };
    let fmt_center = SpecCellFormat {
        align: Some("center".to_string()),
        ..Default::default()
    };

    for (n_idx_row, row) in grid.rows.iter().enumerate() {
        match row.kind {
            EnumSheetRowKind::Separator => {
                style.fmts_by_row.insert(n_idx_row, fmt_separator.clone());
                style
                    .heights_by_row
                    .insert(n_idx_row, options.height_separator);
            }
            EnumSheetRowKind::Summary => {
                style.overlay_cell(n_idx_row, options.col_product, fmt_summary.clone());
                style.overlay_cell(
                    n_idx_row,
                    options.col_quantity,
                    fmt_summary.with_(fmt_center.clone()),
                );
                // The column right of the totals is centered too, without a border.
                style.overlay_cell(n_idx_row, options.col_quantity + 1, fmt_center.clone());
                style.heights_by_row.insert(n_idx_row, options.height_summary);
            }
            EnumSheetRowKind::Header | EnumSheetRowKind::Data | EnumSheetRowKind::Gap => {}
        }
    }

    let l_cols_dedup: Vec<usize> = match (options.rule_dedup, options.col_phone) {
        (Some(EnumDedupKeyRule::RecipientPhone), Some(n_idx_phone)) => {
            vec![options.col_recipient, n_idx_phone]
        }
        _ => vec![options.col_recipient],
    };
    for (n_idx_row, c_color) in colors_duplicate {
        for &n_idx_col in &l_cols_dedup {
            style.overlay_cell(
                *n_idx_row,
                n_idx_col,
                SpecCellFormat {
                    bg_color: Some(c_color.clone()),
                    ..Default::default()
                },
            );
        }
    }

    for ((n_idx_row, n_idx_col), fmt) in fmts_threshold {
        style.overlay_cell(*n_idx_row, *n_idx_col, fmt.clone());
    }

    style
}

#[cfg(test)]
mod tests {
    use orderkit_io_xlsx::{EnumCellValue, SpecSheetRow};

    use super::*;
    use crate::conf::{C_COLOR_ATTENTION, N_HEIGHT_SEPARATOR, N_HEIGHT_SUMMARY};
    use crate::spec::EnumSheetVariant;

    fn build_grid() -> SpecSheetGrid {
        let text = |s: &str| EnumCellValue::String(s.to_string());
        SpecSheetGrid {
            rows: vec![
                SpecSheetRow {
                    kind: EnumSheetRowKind::Header,
                    cells: vec![text("id"), text("name"), text("phone"), text("item"), text("qty")],
                    idx_source: None,
                },
                SpecSheetRow {
                    kind: EnumSheetRowKind::Data,
                    cells: vec![text("1"), text("Kim"), text("010"), text("A"), text("3")],
                    idx_source: Some(0),
                },
                SpecSheetRow::marker(EnumSheetRowKind::Separator),
                SpecSheetRow::marker(EnumSheetRowKind::Gap),
                SpecSheetRow {
                    kind: EnumSheetRowKind::Summary,
                    cells: vec![
                        EnumCellValue::None,
                        EnumCellValue::None,
                        EnumCellValue::None,
                        text("A"),
                        EnumCellValue::Number(3.0),
                    ],
                    idx_source: None,
                },
            ],
        }
    }

    #[test]
    fn test_style_plans_separator_summary_and_widths() {
        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        let style = plan_sheet_style(&build_grid(), &options, &BTreeMap::new(), &BTreeMap::new());

        assert_eq!(style.width_row_fill, N_WIDTH_ROW_FILL_MIN);
        assert_eq!(
            style.fmts_by_row[&2].bg_color.as_deref(),
            Some(C_COLOR_SEPARATOR)
        );
        assert_eq!(style.heights_by_row[&2], N_HEIGHT_SEPARATOR);
        assert_eq!(style.heights_by_row[&4], N_HEIGHT_SUMMARY);
        assert_eq!(style.fmts_by_cell[&(4, 3)].border, Some(1));
        assert_eq!(style.fmts_by_cell[&(4, 4)].align.as_deref(), Some("center"));
        assert_eq!(style.fmts_by_cell[&(4, 5)].align.as_deref(), Some("center"));
        assert_eq!(style.fmts_by_cell[&(4, 5)].border, None);
        assert_eq!(style.widths_by_col, options.widths_by_col);
        assert_eq!(style.fmt_header.bold, Some(true));
        assert!(!style.heights_by_row.contains_key(&3));
    }

    #[test]
    fn test_threshold_fill_wins_over_duplicate_fill() {
        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        options.cols_threshold = vec![1];
        let fmts_threshold = BTreeMap::from([(
            (1, 1),
            SpecCellFormat {
                align: Some("center".to_string()),
                bg_color: Some(C_COLOR_ATTENTION.to_string()),
                ..Default::default()
            },
        )]);
        let colors_duplicate = BTreeMap::from([(1, "#FFF2CC".to_string())]);

        let style = plan_sheet_style(&build_grid(), &options, &fmts_threshold, &colors_duplicate);

        assert_eq!(
            style.fmts_by_cell[&(1, 1)].bg_color.as_deref(),
            Some(C_COLOR_ATTENTION)
        );
        assert_eq!(style.fmts_by_cell[&(1, 2)].bg_color.as_deref(), Some("#FFF2CC"));
    }
}
