//! Shared grid, style and report models.

use std::collections::BTreeMap;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format record (overlay-able; `None` means "inherit").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color (`#RRGGBB`).
    pub bg_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridSpecification

/// Normalized cell value flowing through load/transform/write.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Date or date-time as an Excel 1900-system serial.
    DateTime(f64),
}

static CELL_VALUE_NONE: EnumCellValue = EnumCellValue::None;

/// One loaded data row with its zero-based position in the source body.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRow {
    /// Position in the loaded body (header excluded).
    pub idx_source: usize,
    /// Cell values by output column.
    pub cells: Vec<EnumCellValue>,
}

impl SpecRow {
    /// Cell at `col_idx`, or [`EnumCellValue::None`] past the row end.
    pub fn cell(&self, col_idx: usize) -> &EnumCellValue {
        self.cells.get(col_idx).unwrap_or(&CELL_VALUE_NONE)
    }
}

/// Role of one emitted worksheet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumSheetRowKind {
    /// Column header row.
    Header,
    /// Source data row.
    Data,
    /// Styling-only marker between recipient groups.
    Separator,
    /// Blank spacer before the summary block.
    Gap,
    /// Per-product total row.
    Summary,
}

/// One emitted worksheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetRow {
    /// Row role.
    pub kind: EnumSheetRowKind,
    /// Cell values; empty for separator/gap rows.
    pub cells: Vec<EnumCellValue>,
    /// Source body position for data rows.
    pub idx_source: Option<usize>,
}

impl SpecSheetRow {
    /// Build a data row from a loaded row.
    pub fn from_data(row: &SpecRow) -> Self {
        Self {
            kind: EnumSheetRowKind::Data,
            cells: row.cells.clone(),
            idx_source: Some(row.idx_source),
        }
    }

    /// Build a cell-less row of `kind`.
    pub fn marker(kind: EnumSheetRowKind) -> Self {
        Self {
            kind,
            cells: vec![],
            idx_source: None,
        }
    }

    /// Cell at `col_idx`, or [`EnumCellValue::None`] past the row end.
    pub fn cell(&self, col_idx: usize) -> &EnumCellValue {
        self.cells.get(col_idx).unwrap_or(&CELL_VALUE_NONE)
    }
}

/// Logical worksheet content, row `i` lands on Excel row `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheetGrid {
    /// Emitted rows in order.
    pub rows: Vec<SpecSheetRow>,
}

impl SpecSheetGrid {
    /// Max cell count over all rows.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|row| row.cells.len()).max().unwrap_or(0)
    }
}

/// Declarative presentation plan materialized by [`crate::writer::XlsxWriter`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheetStyle {
    /// Base format for body cells.
    pub fmt_base: SpecCellFormat,
    /// Base format for header cells.
    pub fmt_header: SpecCellFormat,
    /// Whole-row overlays (e.g. separator fill).
    pub fmts_by_row: BTreeMap<usize, SpecCellFormat>,
    /// Number of columns covered by a whole-row overlay.
    pub width_row_fill: usize,
    /// Per-cell overlays keyed by `(row, col)`, applied after row overlays.
    pub fmts_by_cell: BTreeMap<(usize, usize), SpecCellFormat>,
    /// Explicit row heights in points.
    pub heights_by_row: BTreeMap<usize, f64>,
    /// Explicit column widths in character units.
    pub widths_by_col: BTreeMap<usize, f64>,
}

impl SpecSheetStyle {
    /// Overlay `fmt` onto the cell at `(row_idx, col_idx)`.
    pub fn overlay_cell(&mut self, row_idx: usize, col_idx: usize, fmt: SpecCellFormat) {
        let entry = self.fmts_by_cell.entry((row_idx, col_idx)).or_default();
        *entry = entry.merge(&fmt);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Replacement text for non-finite numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
        }
    }
}

/// Autofit policy for columns missing from [`SpecSheetStyle::widths_by_col`].
///
/// Widths are inferred from header and body cells alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Writer-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxWriteOptions {
    /// Non-finite number replacement policy.
    pub value_policy: SpecXlsxValuePolicy,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Frozen row count; `None` disables freeze panes.
    pub row_freeze: Option<usize>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Shape of one written sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetSummary {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Written row count.
    pub n_rows: usize,
    /// Written column count.
    pub n_cols: usize,
}

/// Per-write call report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheets produced by the write call.
    pub sheets: Vec<SpecSheetSummary>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
