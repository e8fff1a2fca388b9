//! Workbook loader and positional column selector.
//!
//! The first worksheet is read with `calamine`, a number of banner rows is
//! skipped, and the next row becomes the header. Body columns whose non-empty
//! cells are all numeric load as `Float64` and all-text columns load as
//! `String`. Columns holding dates or mixed kinds load as a struct of
//! `kind`, `number` and `text` fields so each cell keeps its own kind.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use polars::prelude::{
    AnyValue, Column, DataFrame, DataType, IntoSeries, NamedFrom, PolarsError, Series,
    StructChunked,
};

use crate::error::XlsxIoError;
use crate::spec::{EnumCellValue, SpecRow};
use crate::util::{derive_cell_text, derive_unique_column_names};

////////////////////////////////////////////////////////////////////////////////
// #region Loader

/// Load the first worksheet of `bytes` into a frame.
///
/// Row `n_rows_skip` (0-based) is the header; rows before it are dropped.
/// Blank or repeated header names are made unique.
///
/// # Errors
/// [`XlsxIoError::UnreadableFormat`] when the bytes are not a workbook, the
/// workbook has no sheets, or the header row does not exist.
pub fn load_dataframe(bytes: &[u8], n_rows_skip: usize) -> Result<DataFrame, XlsxIoError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| XlsxIoError::UnreadableFormat(format!("cannot open workbook: {e}")))?;

    let l_sheet_names = workbook.sheet_names();
    let sheet_name = l_sheet_names
        .first()
        .ok_or_else(|| XlsxIoError::UnreadableFormat("workbook contains no sheets".to_string()))?
        .clone();
    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        XlsxIoError::UnreadableFormat(format!("cannot read sheet '{sheet_name}': {e}"))
    })?;

    // Data may not begin at A1.
    let (n_row_start, n_col_start) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut l_grid: Vec<Vec<EnumCellValue>> = vec![vec![]; n_row_start];
    for row in range.rows() {
        let mut l_cells = vec![EnumCellValue::None; n_col_start];
        l_cells.extend(row.iter().map(derive_cell_value_from_data));
        l_grid.push(l_cells);
    }

    if l_grid.len() <= n_rows_skip {
        return Err(XlsxIoError::UnreadableFormat(format!(
            "sheet '{sheet_name}' has no header row at index {n_rows_skip}"
        )));
    }

    let l_rows = l_grid.split_off(n_rows_skip);
    let n_width = l_rows.iter().map(Vec::len).max().unwrap_or(0);
    let l_header_raw: Vec<String> = (0..n_width)
        .map(|n_idx_col| {
            l_rows[0]
                .get(n_idx_col)
                .map(derive_cell_text)
                .unwrap_or_default()
        })
        .collect();
    let l_names = derive_unique_column_names(&l_header_raw);

    let l_body = &l_rows[1..];
    let mut l_columns = Vec::with_capacity(n_width);
    for (n_idx_col, c_name) in l_names.iter().enumerate() {
        let l_values: Vec<EnumCellValue> = l_body
            .iter()
            .map(|row| row.get(n_idx_col).cloned().unwrap_or(EnumCellValue::None))
            .collect();
        l_columns.push(derive_column(c_name, &l_values).map_err(derive_frame_error)?);
    }

    tracing::debug!(
        sheet = %sheet_name,
        n_rows = l_body.len(),
        n_cols = n_width,
        "loaded worksheet"
    );

    DataFrame::new(l_columns).map_err(derive_frame_error)
}

const C_FIELD_KIND: &str = "kind";
const C_FIELD_NUMBER: &str = "number";
const C_FIELD_TEXT: &str = "text";
const C_KIND_NUMBER: &str = "number";
const C_KIND_DATE: &str = "date";
const C_KIND_TEXT: &str = "text";

fn derive_frame_error(err: PolarsError) -> XlsxIoError {
    XlsxIoError::UnreadableFormat(format!("cannot build frame: {err}"))
}

fn derive_column(name: &str, values: &[EnumCellValue]) -> Result<Column, PolarsError> {
    let if_all = |pred: fn(&EnumCellValue) -> bool| {
        values
            .iter()
            .all(|value| matches!(value, EnumCellValue::None) || pred(value))
    };
    let if_numeric = if_all(|value| matches!(value, EnumCellValue::Number(_)))
        && values
            .iter()
            .any(|value| matches!(value, EnumCellValue::Number(_)));

    if if_numeric {
        let l_numbers: Vec<Option<f64>> = values
            .iter()
            .map(|value| match value {
                EnumCellValue::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        return Ok(Column::from(Series::new(name.into(), l_numbers)));
    }
    if if_all(|value| matches!(value, EnumCellValue::String(_))) {
        let l_texts: Vec<Option<&str>> = values
            .iter()
            .map(|value| match value {
                EnumCellValue::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        return Ok(Column::from(Series::new(name.into(), l_texts)));
    }

    let mut l_kinds: Vec<Option<&str>> = Vec::with_capacity(values.len());
    let mut l_numbers: Vec<Option<f64>> = Vec::with_capacity(values.len());
    let mut l_texts: Vec<Option<&str>> = Vec::with_capacity(values.len());
    for value in values {
        let (kind, number, text) = match value {
            EnumCellValue::None => (None, None, None),
            EnumCellValue::Number(n) => (Some(C_KIND_NUMBER), Some(*n), None),
            EnumCellValue::DateTime(n) => (Some(C_KIND_DATE), Some(*n), None),
            EnumCellValue::String(s) => (Some(C_KIND_TEXT), None, Some(s.as_str())),
        };
        l_kinds.push(kind);
        l_numbers.push(number);
        l_texts.push(text);
    }
    let l_fields = [
        Series::new(C_FIELD_KIND.into(), l_kinds),
        Series::new(C_FIELD_NUMBER.into(), l_numbers),
        Series::new(C_FIELD_TEXT.into(), l_texts),
    ];
    let ca = StructChunked::from_series(name.into(), values.len(), l_fields.iter())?;
    Ok(Column::from(ca.into_series()))
}

fn derive_cell_value_from_data(data: &Data) -> EnumCellValue {
    match data {
        Data::Empty => EnumCellValue::None,
        Data::String(s) if s.is_empty() => EnumCellValue::None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            EnumCellValue::String(s.clone())
        }
        Data::Float(n) => EnumCellValue::Number(*n),
        Data::Int(n) => EnumCellValue::Number(*n as f64),
        Data::Bool(b) => EnumCellValue::String(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => EnumCellValue::String(format!("#{e:?}")),
        Data::DateTime(dt) if dt.is_duration() => EnumCellValue::Number(dt.as_f64()),
        Data::DateTime(dt) => EnumCellValue::DateTime(dt.as_f64()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Selector

/// Project `df` onto `(position, name)` pairs, in the given order.
///
/// # Errors
/// [`XlsxIoError::ColumnIndexOutOfRange`] when any position is `>= df.width()`.
pub fn select_columns_by_position(
    df: &DataFrame,
    cols_by_position: &[(usize, String)],
) -> Result<DataFrame, XlsxIoError> {
    let n_width = df.width();
    if let Some(n_idx_max) = cols_by_position.iter().map(|(n_idx, _)| *n_idx).max()
        && n_idx_max >= n_width
    {
        return Err(XlsxIoError::ColumnIndexOutOfRange {
            idx_max: n_idx_max,
            width: n_width,
        });
    }

    let l_names_raw: Vec<String> = cols_by_position
        .iter()
        .map(|(_, c_name)| c_name.clone())
        .collect();
    let l_names = derive_unique_column_names(&l_names_raw);

    let l_cols_src = df.get_columns();
    let l_columns: Vec<Column> = cols_by_position
        .iter()
        .zip(l_names)
        .map(|((n_idx, _), c_name)| {
            let mut col = l_cols_src[*n_idx].clone();
            col.rename(c_name.into());
            col
        })
        .collect();

    DataFrame::new(l_columns)
        .map_err(|e| XlsxIoError::UnreadableFormat(format!("cannot project frame: {e}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FrameToRows

/// Column names of `df`, in order.
pub fn derive_header_from_dataframe(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

/// Materialize `df` into rows tagged with their body position.
pub fn derive_rows_from_dataframe(df: &DataFrame) -> Result<Vec<SpecRow>, XlsxIoError> {
    let l_cols_cells = df
        .get_columns()
        .iter()
        .map(derive_cells_from_column)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| XlsxIoError::UnreadableFormat(format!("cannot read cell value: {e}")))?;

    let mut l_iters: Vec<_> = l_cols_cells.into_iter().map(Vec::into_iter).collect();
    let l_rows = (0..df.height())
        .map(|n_idx_row| SpecRow {
            idx_source: n_idx_row,
            cells: l_iters
                .iter_mut()
                .map(|iter| iter.next().unwrap_or(EnumCellValue::None))
                .collect(),
        })
        .collect();
    Ok(l_rows)
}

fn derive_cells_from_column(col: &Column) -> Result<Vec<EnumCellValue>, PolarsError> {
    if !matches!(col.dtype(), DataType::Struct(_)) {
        return (0..col.len())
            .map(|n_idx| col.get(n_idx).map(derive_cell_value_from_any_value))
            .collect();
    }

    let ca = col.struct_()?;
    let s_kind = ca.field_by_name(C_FIELD_KIND)?;
    let s_number = ca.field_by_name(C_FIELD_NUMBER)?;
    let s_text = ca.field_by_name(C_FIELD_TEXT)?;
    let (ca_kind, ca_number, ca_text) = (s_kind.str()?, s_number.f64()?, s_text.str()?);

    let l_cells = (0..col.len())
        .map(|n_idx| match ca_kind.get(n_idx) {
            Some(C_KIND_NUMBER) => ca_number
                .get(n_idx)
                .map_or(EnumCellValue::None, EnumCellValue::Number),
            Some(C_KIND_DATE) => ca_number
                .get(n_idx)
                .map_or(EnumCellValue::None, EnumCellValue::DateTime),
            Some(C_KIND_TEXT) => ca_text
                .get(n_idx)
                .map_or(EnumCellValue::None, |s| EnumCellValue::String(s.to_string())),
            _ => EnumCellValue::None,
        })
        .collect();
    Ok(l_cells)
}

fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => {
            EnumCellValue::String(if val { "TRUE" } else { "FALSE" }.to_string())
        }
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        _ => EnumCellValue::String(value.to_string()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
