//! Stateless helper utilities shared by the reader, writer and transform layer.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::conf::{
    C_NUM_FORMAT_DATE, C_NUM_FORMAT_DATETIME, C_NUM_FORMAT_TIME, N_LEN_EXCEL_SHEET_NAME_MAX,
    TUP_EXCEL_ILLEGAL,
};
use crate::spec::{EnumCellValue, SpecXlsxValuePolicy};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Convert `NaN`/`Inf` to policy string; return error for finite values.
pub fn convert_nan_inf_to_str(
    x: f64,
    value_policy: &SpecXlsxValuePolicy,
) -> Result<String, String> {
    if x.is_nan() {
        return Ok(value_policy.nan_str.clone());
    }
    if x.is_infinite() {
        return Ok(if x.is_sign_positive() {
            value_policy.posinf_str.clone()
        } else {
            value_policy.neginf_str.clone()
        });
    }
    Err("Input is neither NaN nor Inf.".to_string())
}

/// Render a cell as display text.
///
/// Missing cells render as `""`; integral numbers render without a decimal
/// part; dates render as ISO text.
pub fn derive_cell_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(s) => s.clone(),
        EnumCellValue::Number(n) => derive_number_text(*n),
        EnumCellValue::DateTime(n) => derive_excel_date_text(*n),
    }
}

fn derive_number_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn derive_excel_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let n_days = serial.floor() as i64;
    let n_secs = ((serial - serial.floor()) * 86_400.0).round() as i64;
    // Serials below 61 precede the phantom 1900-02-29.
    let date_epoch = if n_days < 61 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    date_epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_days(n_days)?)?
        .checked_add_signed(TimeDelta::try_seconds(n_secs)?)
}

/// Render an Excel 1900-system serial as `YYYY-MM-DD[ HH:MM:SS]`.
///
/// Serials that do not map to a calendar date fall back to number text.
pub fn derive_excel_date_text(serial: f64) -> String {
    let Some(dt) = derive_excel_datetime(serial) else {
        return derive_number_text(serial);
    };
    match derive_date_num_format(serial) {
        C_NUM_FORMAT_TIME => dt.format("%H:%M:%S").to_string(),
        C_NUM_FORMAT_DATETIME => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => dt.format("%Y-%m-%d").to_string(),
    }
}

/// Number format matching the date/time parts present in `serial`.
pub fn derive_date_num_format(serial: f64) -> &'static str {
    let if_date = serial.floor() > 0.0;
    let if_time = (serial - serial.floor()).abs() * 86_400.0 >= 0.5;
    match (if_date, if_time) {
        (true, true) => C_NUM_FORMAT_DATETIME,
        (false, true) => C_NUM_FORMAT_TIME,
        _ => C_NUM_FORMAT_DATE,
    }
}

/// Parse a cell as a finite number.
///
/// Text is trimmed before parsing. Blank, non-numeric and non-finite values
/// yield `None`; callers degrade to zero or "no highlight" instead of failing.
pub fn parse_number(value: &EnumCellValue) -> Option<f64> {
    let n_value = match value {
        EnumCellValue::None | EnumCellValue::DateTime(_) => return None,
        EnumCellValue::Number(n) => *n,
        EnumCellValue::String(s) => s.trim().parse::<f64>().ok()?,
    };
    n_value.is_finite().then_some(n_value)
}

/// `true` when the cell is missing or whitespace-only text.
pub fn is_blank(value: &EnumCellValue) -> bool {
    match value {
        EnumCellValue::None => true,
        EnumCellValue::String(s) => s.trim().is_empty(),
        EnumCellValue::Number(_) | EnumCellValue::DateTime(_) => false,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnNames

/// Derive unique, non-empty column names from raw header texts.
///
/// Blank names become `col_<idx>`; repeats get a `__<n>` suffix (`n >= 2`).
pub fn derive_unique_column_names(names_raw: &[String]) -> Vec<String> {
    let mut set_names_taken = BTreeSet::new();
    let mut l_names = Vec::with_capacity(names_raw.len());

    for (n_idx, c_name_raw) in names_raw.iter().enumerate() {
        let c_name_base = match c_name_raw.trim() {
            "" => format!("col_{n_idx}"),
            c_name => c_name.to_string(),
        };

        let mut c_name = c_name_base.clone();
        let mut n_suffix = 2usize;
        while set_names_taken.contains(&c_name) {
            c_name = format!("{c_name_base}__{n_suffix}");
            n_suffix += 1;
        }
        set_names_taken.insert(c_name.clone());
        l_names.push(c_name);
    }

    l_names
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Estimate displayed width units for one cell value.
///
/// Non-ASCII characters (Hangul, CJK) count as 1.6 units.
pub fn estimate_width_len(value: &EnumCellValue, value_policy: &SpecXlsxValuePolicy) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::Number(n) if !n.is_finite() => convert_nan_inf_to_str(*n, value_policy)
            .map(|s| s.len())
            .unwrap_or(0),
        _ => estimate_unicode_string_width(&derive_cell_text(value)),
    }
}

fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
