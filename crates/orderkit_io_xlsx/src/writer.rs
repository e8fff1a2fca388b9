//! Grid + style-plan writer on top of `rust_xlsxwriter`.

use std::collections::{BTreeSet, HashMap};

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_WIDTH_EXCEL_COLUMN_MAX,
};
use crate::error::XlsxIoError;
use crate::spec::{
    EnumCellValue, EnumSheetRowKind, SpecAutofitCellsPolicy, SpecCellFormat, SpecSheetGrid,
    SpecSheetStyle, SpecSheetSummary, SpecXlsxReport, SpecXlsxValuePolicy, SpecXlsxWriteOptions,
};
use crate::util::{
    convert_nan_inf_to_str, derive_date_num_format, estimate_width_len, sanitize_sheet_name,
};

/// Stateful in-memory workbook writer.
///
/// Sheets are added with [`Self::write_sheet`]; nothing leaves memory until
/// [`Self::save_to_buffer`].
pub struct XlsxWriter {
    workbook: Workbook,
    write_options: SpecXlsxWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    report: SpecXlsxReport,
}

impl Default for XlsxWriter {
    fn default() -> Self {
        Self::new(SpecXlsxWriteOptions::default())
    }
}

impl XlsxWriter {
    pub fn new(write_options: SpecXlsxWriteOptions) -> Self {
        Self {
            workbook: Workbook::new(),
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            report: SpecXlsxReport::default(),
        }
    }

    /// Snapshot of sheets written so far.
    pub fn report(&self) -> SpecXlsxReport {
        self.report.clone()
    }

    /// Materialize `grid` into a new worksheet, applying `style`.
    ///
    /// Row `i` of the grid lands on worksheet row `i`. The effective format
    /// of a cell is the header/base format, then its row overlay, then its
    /// cell overlay. Columns without an explicit width are autofit.
    pub fn write_sheet(
        &mut self,
        grid: &SpecSheetGrid,
        style: &SpecSheetStyle,
        sheet_name: &str,
    ) -> Result<(), XlsxIoError> {
        validate_policy_autofit(&self.write_options.policy_autofit)?;

        let n_rows = grid.rows.len();
        let n_cols = derive_sheet_width(grid, style);
        if n_rows > N_NROWS_EXCEL_MAX {
            return Err(XlsxIoError::Export(format!(
                "{n_rows} rows exceed the Excel limit of {N_NROWS_EXCEL_MAX}"
            )));
        }
        if n_cols > N_NCOLS_EXCEL_MAX {
            return Err(XlsxIoError::Export(format!(
                "{n_cols} columns exceed the Excel limit of {N_NCOLS_EXCEL_MAX}"
            )));
        }

        let sheet_name_unique = self.derive_unique_sheet_name(&sanitize_sheet_name(sheet_name, "_"));
        let value_policy = self.write_options.value_policy.clone();
        let policy_autofit = self.write_options.policy_autofit.clone();
        let row_freeze = self.write_options.row_freeze;

        let worksheet = self.workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name_unique)
            .map_err(derive_xlsx_error)?;

        let mut dict_fmt_cache: HashMap<SpecCellFormat, Format> = HashMap::new();
        let mut l_width_by_col = vec![0usize; n_cols];

        for (n_idx_row, row) in grid.rows.iter().enumerate() {
            let fmt_base = match row.kind {
                EnumSheetRowKind::Header => &style.fmt_header,
                _ => &style.fmt_base,
            };
            let fmt_row = style.fmts_by_row.get(&n_idx_row);

            let mut set_cols: BTreeSet<usize> = (0..row.cells.len()).collect();
            if fmt_row.is_some() {
                set_cols.extend(0..style.width_row_fill);
            }
            set_cols.extend(
                style
                    .fmts_by_cell
                    .range((n_idx_row, 0)..(n_idx_row + 1, 0))
                    .map(|((_, n_idx_col), _)| *n_idx_col),
            );

            for n_idx_col in set_cols {
                let value = row.cell(n_idx_col);
                let fmt_cell = style.fmts_by_cell.get(&(n_idx_row, n_idx_col));
                if *value == EnumCellValue::None && fmt_row.is_none() && fmt_cell.is_none() {
                    continue;
                }

                let mut fmt_spec = fmt_base.clone();
                if let Some(fmt) = fmt_row {
                    fmt_spec = fmt_spec.merge(fmt);
                }
                if let Some(fmt) = fmt_cell {
                    fmt_spec = fmt_spec.merge(fmt);
                }
                if let EnumCellValue::DateTime(n_serial) = value
                    && fmt_spec.num_format.is_none()
                {
                    fmt_spec.num_format = Some(derive_date_num_format(*n_serial).to_string());
                }
                let format = dict_fmt_cache
                    .entry(fmt_spec)
                    .or_insert_with_key(derive_rust_xlsx_format);

                write_cell_with_format(
                    worksheet,
                    n_idx_row,
                    n_idx_col,
                    value,
                    format,
                    &value_policy,
                )?;

                l_width_by_col[n_idx_col] = usize::max(
                    l_width_by_col[n_idx_col],
                    estimate_width_len(value, &value_policy),
                );
            }
        }

        for (n_idx_row, n_height) in &style.heights_by_row {
            worksheet
                .set_row_height(cast_row_num(*n_idx_row)?, *n_height)
                .map_err(derive_xlsx_error)?;
        }

        let n_min = usize::max(1, policy_autofit.width_cell_min);
        let n_max = usize::min(
            N_WIDTH_EXCEL_COLUMN_MAX,
            usize::max(n_min, policy_autofit.width_cell_max),
        );
        for n_idx_col in 0..n_cols {
            if let Some(n_width) = style.widths_by_col.get(&n_idx_col) {
                worksheet
                    .set_column_width(cast_col_num(n_idx_col)?, *n_width)
                    .map_err(derive_xlsx_error)?;
                continue;
            }
            let n_width_recorded = l_width_by_col[n_idx_col];
            // Fill-only columns keep the Excel default.
            if n_width_recorded == 0 {
                continue;
            }
            let n_width_final = usize::min(
                n_max,
                usize::max(n_min, n_width_recorded + policy_autofit.width_cell_padding),
            );
            worksheet
                .set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)
                .map_err(derive_xlsx_error)?;
        }

        if let Some(n_row_freeze) = row_freeze
            && n_row_freeze > 0
        {
            worksheet
                .set_freeze_panes(cast_row_num(n_row_freeze)?, 0)
                .map_err(derive_xlsx_error)?;
        }

        tracing::debug!(
            sheet = %sheet_name_unique,
            n_rows,
            n_cols,
            n_formats = dict_fmt_cache.len(),
            "wrote worksheet"
        );
        self.report.sheets.push(SpecSheetSummary {
            sheet_name: sheet_name_unique,
            n_rows,
            n_cols,
        });
        Ok(())
    }

    /// Serialize the workbook to xlsx bytes.
    pub fn save_to_buffer(&mut self) -> Result<Vec<u8>, XlsxIoError> {
        if self.report.sheets.is_empty() {
            self.report.warn("workbook has no sheets; writing an empty sheet");
        }
        self.workbook.save_to_buffer().map_err(derive_xlsx_error)
    }

    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if !self.set_sheet_names_existing.contains(name) {
            self.set_sheet_names_existing.insert(name.to_string());
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if !self.set_sheet_names_existing.contains(&candidate) {
                self.set_sheet_names_existing.insert(candidate.clone());
                return candidate;
            }
            n_idx += 1;
        }
    }
}

fn derive_sheet_width(grid: &SpecSheetGrid, style: &SpecSheetStyle) -> usize {
    let n_width_fill = if style.fmts_by_row.is_empty() {
        0
    } else {
        style.width_row_fill
    };
    let n_width_cells = style
        .fmts_by_cell
        .keys()
        .map(|(_, n_idx_col)| n_idx_col + 1)
        .max()
        .unwrap_or(0);
    grid.width().max(n_width_fill).max(n_width_cells)
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<(), XlsxIoError> {
    if policy_autofit.width_cell_min > policy_autofit.width_cell_max {
        return Err(XlsxIoError::Export(format!(
            "autofit min width {} exceeds max width {}",
            policy_autofit.width_cell_min, policy_autofit.width_cell_max
        )));
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
    value_policy: &SpecXlsxValuePolicy,
) -> Result<(), XlsxIoError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(n_row, n_col, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::String(val) => {
            worksheet
                .write_string_with_format(n_row, n_col, val, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::Number(val) | EnumCellValue::DateTime(val) if !val.is_finite() => {
            let c_text = convert_nan_inf_to_str(*val, value_policy).map_err(XlsxIoError::Export)?;
            worksheet
                .write_string_with_format(n_row, n_col, c_text, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::Number(val) | EnumCellValue::DateTime(val) => {
            worksheet
                .write_number_with_format(n_row, n_col, *val, format)
                .map_err(derive_xlsx_error)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, XlsxIoError> {
    u32::try_from(value).map_err(|_| XlsxIoError::Export(format!("row index overflow: {value}")))
}

fn cast_col_num(value: usize) -> Result<u16, XlsxIoError> {
    u16::try_from(value)
        .map_err(|_| XlsxIoError::Export(format!("column index overflow: {value}")))
}

fn derive_xlsx_error(err: XlsxError) -> XlsxIoError {
    XlsxIoError::Export(err.to_string())
}
