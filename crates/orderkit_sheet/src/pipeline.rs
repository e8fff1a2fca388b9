//! End-to-end order-sheet transform: decrypt, load, reshape, style, export.

use std::collections::BTreeSet;

use orderkit_io_xlsx::conf::derive_default_xlsx_write_options;
use orderkit_io_xlsx::{
    EnumCellValue, EnumSheetRowKind, SpecRow, SpecSheetGrid, SpecSheetRow, SpecXlsxWriteOptions,
    XlsxWriter, decrypt_workbook_bytes, derive_header_from_dataframe, derive_rows_from_dataframe,
    load_dataframe, select_columns_by_position,
};
use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::error::ProcessSheetError;
use crate::group::{group_rows, linearize, linearize_flat, sequence_groups, sort_group};
use crate::highlight::{count_threshold_hits, plan_duplicate_highlights, plan_threshold_highlights};
use crate::naming::derive_output_filename;
use crate::spec::{
    EnumBodyRow, EnumDedupKeyRule, EnumLayoutRule, SpecGroup, SpecLinearized,
    SpecProcessReport, SpecProcessedWorkbook, SpecSummaryEntry, SpecTransformOptions,
};
use crate::style::plan_sheet_style;

////////////////////////////////////////////////////////////////////////////////
// #region Validation

/// Check options that do not depend on the loaded table.
pub fn validate_options(options: &SpecTransformOptions) -> Result<(), ProcessSheetError> {
    if !options.n_threshold.is_finite() {
        return Err(ProcessSheetError::InvalidOptions(format!(
            "n_threshold must be finite, got {}",
            options.n_threshold
        )));
    }
    if options.rule_dedup == Some(EnumDedupKeyRule::RecipientPhone) && options.col_phone.is_none()
    {
        return Err(ProcessSheetError::InvalidOptions(
            "rule_dedup = recipient_phone requires col_phone".to_string(),
        ));
    }
    for (c_field, n_value) in [
        ("height_separator", options.height_separator),
        ("height_summary", options.height_summary),
    ] {
        if !(n_value.is_finite() && n_value > 0.0) {
            return Err(ProcessSheetError::InvalidOptions(format!(
                "{c_field} must be a positive number, got {n_value}"
            )));
        }
    }
    if let Some((n_idx_col, n_width)) = options
        .widths_by_col
        .iter()
        .find(|(_, n_width)| !(n_width.is_finite() && **n_width > 0.0))
    {
        return Err(ProcessSheetError::InvalidOptions(format!(
            "width of column {n_idx_col} must be a positive number, got {n_width}"
        )));
    }

    let mut set_names = BTreeSet::new();
    for (_, c_name) in &options.cols_projection {
        let c_name = c_name.trim();
        if c_name.is_empty() {
            return Err(ProcessSheetError::InvalidOptions(
                "projection names must not be blank".to_string(),
            ));
        }
        if !set_names.insert(c_name) {
            return Err(ProcessSheetError::InvalidOptions(format!(
                "projection name '{c_name}' is repeated"
            )));
        }
    }
    Ok(())
}

/// Check that the key columns exist in a table of `n_width` columns.
///
/// Threshold columns are not checked; cells past the row end read as blank.
pub fn validate_columns(
    options: &SpecTransformOptions,
    n_width: usize,
) -> Result<(), ProcessSheetError> {
    let l_cols = [
        ("col_recipient", Some(options.col_recipient)),
        ("col_product", Some(options.col_product)),
        ("col_quantity", Some(options.col_quantity)),
        ("col_phone", options.col_phone),
    ];
    for (c_field, n_idx_col) in l_cols {
        if let Some(n_idx_col) = n_idx_col
            && n_idx_col >= n_width
        {
            return Err(ProcessSheetError::InvalidOptions(format!(
                "{c_field} = {n_idx_col} is out of range (table has {n_width} columns)"
            )));
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridAssembly

/// Header texts as shown in the sheet; generated names of blank headers
/// render blank.
fn derive_header_cells(l_names: &[String], if_projected: bool) -> Vec<EnumCellValue> {
    l_names
        .iter()
        .enumerate()
        .map(|(n_idx, c_name)| {
            if !if_projected && *c_name == format!("col_{n_idx}") {
                EnumCellValue::None
            } else {
                EnumCellValue::String(c_name.clone())
            }
        })
        .collect()
}

/// Arrange loaded rows per the layout rule. Returns the body and the group count.
pub fn derive_layout(l_rows: &[SpecRow], options: &SpecTransformOptions) -> (SpecLinearized, usize) {
    match options.rule_layout {
        EnumLayoutRule::Flat => (linearize_flat(l_rows, options.col_recipient), 0),
        EnumLayoutRule::Grouped => {
            let l_groups: Vec<SpecGroup> = group_rows(l_rows, options.col_recipient, options.rule_group)
                .iter()
                .map(|group| sort_group(group, options.col_product))
                .collect();
            let n_groups = l_groups.len();
            let l_groups = sequence_groups(l_groups, options.col_product);
            (linearize(&l_groups), n_groups)
        }
    }
}

/// Assemble header, body, gap and summary rows into one grid.
pub fn build_sheet_grid(
    header: Vec<EnumCellValue>,
    linearized: &SpecLinearized,
    l_entries: &[SpecSummaryEntry],
    options: &SpecTransformOptions,
) -> SpecSheetGrid {
    let mut l_rows = Vec::with_capacity(1 + linearized.rows.len() + l_entries.len());
    l_rows.push(SpecSheetRow {
        kind: EnumSheetRowKind::Header,
        cells: header,
        idx_source: None,
    });
    l_rows.extend(linearized.rows.iter().map(|row| match row {
        EnumBodyRow::Data(row) => SpecSheetRow::from_data(row),
        EnumBodyRow::Separator => SpecSheetRow::marker(EnumSheetRowKind::Separator),
    }));

    if !l_entries.is_empty() {
        l_rows.extend(
            (0..options.n_rows_summary_gap).map(|_| SpecSheetRow::marker(EnumSheetRowKind::Gap)),
        );
        let n_width_summary = usize::max(options.col_product, options.col_quantity) + 1;
        for entry in l_entries {
            let mut l_cells = vec![EnumCellValue::None; n_width_summary];
            l_cells[options.col_product] = EnumCellValue::String(entry.product.clone());
            l_cells[options.col_quantity] = EnumCellValue::Number(entry.total);
            l_rows.push(SpecSheetRow {
                kind: EnumSheetRowKind::Summary,
                cells: l_cells,
                idx_source: None,
            });
        }
    }

    SpecSheetGrid { rows: l_rows }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Process

/// Run the whole transform over an uploaded workbook.
///
/// Nothing is returned unless every stage succeeds.
///
/// # Errors
/// - [`ProcessSheetError::InvalidOptions`] for inconsistent options or key
///   columns missing from the loaded table.
/// - [`ProcessSheetError::Io`] for decrypt, load, projection and export failures.
pub fn process_workbook(
    bytes: &[u8],
    filename: &str,
    password: Option<&str>,
    options: &SpecTransformOptions,
) -> Result<SpecProcessedWorkbook, ProcessSheetError> {
    validate_options(options)?;
    info!(
        filename,
        variant = %options.variant,
        n_bytes = bytes.len(),
        "processing workbook"
    );

    let bytes_plain = decrypt_workbook_bytes(bytes, password)?;
    let df_loaded = load_dataframe(&bytes_plain, options.n_rows_skip)?;
    let if_projected = !options.cols_projection.is_empty();
    let df = if if_projected {
        select_columns_by_position(&df_loaded, &options.cols_projection)?
    } else {
        df_loaded
    };
    validate_columns(options, df.width())?;

    let l_rows = derive_rows_from_dataframe(&df)?;
    let header = derive_header_cells(&derive_header_from_dataframe(&df), if_projected);
    debug!(n_rows = l_rows.len(), n_cols = df.width(), "loaded table");

    let (linearized, n_groups) = derive_layout(&l_rows, options);
    let l_entries = aggregate(
        linearized.data_rows(),
        options.col_product,
        options.col_quantity,
        options.rule_summary_order,
    );
    debug!(
        n_groups,
        n_separators = linearized.idx_separators.len(),
        n_summary_entries = l_entries.len(),
        "reshaped rows"
    );

    let grid = build_sheet_grid(header, &linearized, &l_entries, options);
    let fmts_threshold = plan_threshold_highlights(
        &grid,
        options.col_recipient,
        &options.cols_threshold,
        options.n_threshold,
    );
    let colors_duplicate = match options.rule_dedup {
        Some(rule) => {
            plan_duplicate_highlights(&grid, options.col_recipient, options.col_phone, rule)
        }
        None => Default::default(),
    };
    let style = plan_sheet_style(&grid, options, &fmts_threshold, &colors_duplicate);

    let mut writer = XlsxWriter::new(SpecXlsxWriteOptions {
        row_freeze: options.if_freeze_header.then_some(1),
        ..derive_default_xlsx_write_options()
    });
    writer.write_sheet(&grid, &style, &options.sheet_name)?;
    let bytes_out = writer.save_to_buffer()?;

    let n_rows_data = linearized.data_rows().count();
    let report = SpecProcessReport {
        n_rows_loaded: l_rows.len(),
        n_rows_data,
        n_rows_dropped: l_rows.len() - n_rows_data,
        n_groups,
        n_separators: linearized.idx_separators.len(),
        n_summary_entries: l_entries.len(),
        n_cells_threshold: count_threshold_hits(&fmts_threshold),
        n_rows_duplicate: colors_duplicate.len(),
        xlsx: writer.report(),
    };
    let filename_out = derive_output_filename(filename, options.variant);
    info!(
        filename_out = %filename_out,
        n_rows_data = report.n_rows_data,
        n_rows_dropped = report.n_rows_dropped,
        n_bytes = bytes_out.len(),
        "workbook processed"
    );

    Ok(SpecProcessedWorkbook {
        filename: filename_out,
        bytes: bytes_out,
        report,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx};
    use orderkit_io_xlsx::XlsxIoError;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    use super::*;
    use crate::spec::{EnumSheetVariant, SpecTransformOptionsPatch};

    fn build_result_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (n_idx, c_name) in ["번호", "수취인명", "상품명", "수량"].iter().enumerate() {
            worksheet.write_string(0, n_idx as u16, *c_name).unwrap();
        }
        let l_body: [(&str, &str, f64); 4] = [
            ("Kim", "A", 1.0),
            ("Kim", "B", 2.0),
            ("Lee", "A", 3.0),
            ("Park", "C", 1.0),
        ];
        for (n_idx, (c_name, c_product, n_qty)) in l_body.iter().enumerate() {
            let n_row = n_idx as u32 + 1;
            worksheet.write_number(n_row, 0, n_row as f64).unwrap();
            worksheet.write_string(n_row, 1, *c_name).unwrap();
            worksheet.write_string(n_row, 2, *c_product).unwrap();
            worksheet.write_number(n_row, 3, *n_qty).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn build_form_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "스마트스토어 주문").unwrap();
        let l_header = [
            "주문번호", "수취인명", "연락처", "상품명", "수량", "주소", "배송메세지", "기타",
        ];
        for (n_idx, c_name) in l_header.iter().enumerate() {
            worksheet.write_string(1, n_idx as u16, *c_name).unwrap();
        }
        let l_body: [(&str, &str, &str, &str); 4] = [
            ("Kim", "010-1", "A", "1"),
            ("Lee", "010-2", "B", "3"),
            ("", "", "Z", "9"),
            ("Kim", "010-1", "A", "2"),
        ];
        for (n_idx, (c_name, c_phone, c_product, c_qty)) in l_body.iter().enumerate() {
            let n_row = n_idx as u32 + 2;
            worksheet.write_number(n_row, 0, n_row as f64).unwrap();
            for (n_idx_col, c_value) in [(1, c_name), (2, c_phone), (3, c_product), (4, c_qty)] {
                if !c_value.is_empty() {
                    worksheet.write_string(n_row, n_idx_col, *c_value).unwrap();
                }
            }
            worksheet.write_string(n_row, 5, "Seoul").unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn read_back(bytes: Vec<u8>, sheet_name: &str) -> calamine::Range<Data> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        workbook.worksheet_range(sheet_name).unwrap()
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn test_result_variant_keeps_order_and_separates_recipients() {
        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Result);
        let processed = process_workbook(
            &build_result_workbook(),
            "orders_20240115.xlsx",
            None,
            &options,
        )
        .unwrap();

        assert_eq!(processed.filename, "결과_20240115.xlsx");
        assert_eq!(processed.report.n_rows_data, 4);
        assert_eq!(processed.report.n_separators, 2);
        assert_eq!(processed.report.n_summary_entries, 3);
        assert_eq!(processed.report.n_cells_threshold, 2);

        let range = read_back(processed.bytes, "결과");
        assert_eq!(range.get_value((0, 1)), Some(&text("수취인명")));
        assert_eq!(range.get_value((1, 1)), Some(&text("Kim")));
        assert_eq!(range.get_value((2, 2)), Some(&text("B")));
        assert_eq!(range.get_value((3, 1)), Some(&Data::Empty));
        assert_eq!(range.get_value((4, 1)), Some(&text("Lee")));
        assert_eq!(range.get_value((6, 1)), Some(&text("Park")));
        // Header, 4 data rows, 2 separators, 1 gap, then the summary block.
        assert_eq!(range.get_value((8, 2)), Some(&text("A")));
        assert_eq!(range.get_value((8, 3)), Some(&Data::Float(4.0)));
        assert_eq!(range.get_value((9, 2)), Some(&text("B")));
        assert_eq!(range.get_value((10, 3)), Some(&Data::Float(1.0)));
    }

    #[test]
    fn test_dates_and_numbers_in_mixed_columns_survive_the_round_trip() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (n_idx, c_name) in ["주문일", "수취인명", "상품명", "수량"].iter().enumerate() {
            worksheet.write_string(0, n_idx as u16, *c_name).unwrap();
        }
        let date = ExcelDateTime::from_ymd(2024, 1, 15).unwrap();
        let fmt_date = Format::new().set_num_format("yyyy-mm-dd");
        worksheet.write_datetime_with_format(1, 0, &date, &fmt_date).unwrap();
        worksheet.write_string(1, 1, "Kim").unwrap();
        worksheet.write_string(1, 2, "A").unwrap();
        worksheet.write_number(1, 3, 2.0).unwrap();
        worksheet.write_number(2, 0, 2.0).unwrap();
        worksheet.write_string(2, 1, "Kim").unwrap();
        worksheet.write_string(2, 2, "B").unwrap();
        worksheet.write_string(2, 3, "1개").unwrap();
        worksheet.write_number(3, 0, 3.0).unwrap();
        worksheet.write_string(3, 1, "Lee").unwrap();
        worksheet.write_string(3, 2, "A").unwrap();
        worksheet.write_number(3, 3, 3.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Result);
        let processed = process_workbook(&bytes, "orders.xlsx", None, &options).unwrap();

        let range = read_back(processed.bytes, "결과");
        match range.get_value((1, 0)) {
            Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 45306.0),
            other => panic!("expected a date cell, got {other:?}"),
        }
        assert_eq!(range.get_value((2, 0)), Some(&Data::Float(2.0)));
        assert_eq!(range.get_value((1, 3)), Some(&Data::Float(2.0)));
        assert_eq!(range.get_value((2, 3)), Some(&text("1개")));
        assert_eq!(range.get_value((4, 3)), Some(&Data::Float(3.0)));
    }

    #[test]
    fn test_form_variant_projects_groups_and_drops_blank_recipients() {
        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        let processed =
            process_workbook(&build_form_workbook(), "upload.xlsx", None, &options).unwrap();

        assert_eq!(processed.filename, "processed_excel.xlsx");
        let report = &processed.report;
        assert_eq!(report.n_rows_loaded, 4);
        assert_eq!(report.n_rows_data, 3);
        assert_eq!(report.n_rows_dropped, 1);
        assert_eq!(report.n_groups, 2);
        assert_eq!(report.n_rows_duplicate, 2);
        assert_eq!(report.xlsx.sheets[0].sheet_name, "양식");

        let range = read_back(processed.bytes, "양식");
        assert_eq!(range.get_value((0, 6)), Some(&text("배송메세지")));
        assert_eq!(range.get_value((1, 1)), Some(&text("Kim")));
        assert_eq!(range.get_value((2, 1)), Some(&text("Kim")));
        assert_eq!(range.get_value((2, 4)), Some(&text("2")));
        assert_eq!(range.get_value((4, 1)), Some(&text("Lee")));
        assert_eq!(range.get_value((6, 3)), Some(&text("A")));
        assert_eq!(range.get_value((6, 4)), Some(&Data::Float(3.0)));
        assert_eq!(range.get_value((7, 3)), Some(&text("B")));
    }

    #[test]
    fn test_config_patch_switches_layout() {
        let patch = SpecTransformOptionsPatch::from_toml_str(
            "rule_layout = \"grouped\"\nrule_summary_order = \"by_product\"",
        )
        .unwrap();
        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Result).with_patch(patch);
        let processed = process_workbook(&build_result_workbook(), "x.xlsx", None, &options).unwrap();

        assert_eq!(processed.report.n_groups, 3);
        let range = read_back(processed.bytes, "결과");
        // Groups sequenced by first product: Kim(A, B), Lee(A), Park(C).
        assert_eq!(range.get_value((1, 1)), Some(&text("Kim")));
        assert_eq!(range.get_value((4, 1)), Some(&text("Lee")));
        assert_eq!(range.get_value((6, 1)), Some(&text("Park")));
    }

    #[test]
    fn test_errors_surface_before_any_output() {
        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        options.cols_projection.push((20, "없음".to_string()));
        let err = process_workbook(&build_form_workbook(), "x.xlsx", None, &options).unwrap_err();
        assert!(matches!(
            err,
            ProcessSheetError::Io(XlsxIoError::ColumnIndexOutOfRange { idx_max: 20, width: 8 })
        ));
        assert!(err.is_input_error());

        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Result);
        options.col_quantity = 9;
        let err = process_workbook(&build_result_workbook(), "x.xlsx", None, &options).unwrap_err();
        assert!(matches!(err, ProcessSheetError::InvalidOptions(_)));

        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Result);
        let err = process_workbook(b"not a workbook", "x.xlsx", None, &options).unwrap_err();
        assert!(matches!(err, ProcessSheetError::Io(XlsxIoError::UnreadableFormat(_))));
    }

    #[test]
    fn test_validate_options_rejects_inconsistent_settings() {
        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        options.col_phone = None;
        assert!(validate_options(&options).is_err());

        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Result);
        options.n_threshold = f64::NAN;
        assert!(validate_options(&options).is_err());

        let mut options = SpecTransformOptions::from_variant(EnumSheetVariant::Form);
        options.cols_projection[1].1 = "주문번호".to_string();
        assert!(validate_options(&options).is_err());

        assert!(validate_options(&SpecTransformOptions::default()).is_ok());
    }
}
