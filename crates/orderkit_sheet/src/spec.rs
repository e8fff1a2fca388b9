//! Transform models, option structs and the processed-workbook result.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use orderkit_io_xlsx::{SpecRow, SpecXlsxReport};
use serde::Deserialize;

use crate::conf::derive_variant_options;

////////////////////////////////////////////////////////////////////////////////
// #region Enums

/// Output preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumSheetVariant {
    /// "결과": flat layout over the unprojected sheet.
    #[default]
    Result,
    /// "양식": projected, grouped, dedup-highlighted order form.
    Form,
}

impl EnumSheetVariant {
    /// Korean label used in file and sheet names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Result => "결과",
            Self::Form => "양식",
        }
    }
}

impl fmt::Display for EnumSheetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result => write!(f, "result"),
            Self::Form => write!(f, "form"),
        }
    }
}

impl FromStr for EnumSheetVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "result" | "결과" => Ok(Self::Result),
            "form" | "양식" => Ok(Self::Form),
            other => Err(format!(
                "unknown variant '{other}'; expected 'result' or 'form'"
            )),
        }
    }
}

/// Recipient grouping policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumGroupRule {
    /// Adjacent rows with equal recipient form a group; a blank recipient closes it.
    Contiguous,
    /// All rows with equal recipient form one group, ordered by first sighting.
    #[default]
    Keyed,
}

/// Output row arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumLayoutRule {
    /// Source order kept; separators between adjacent differing recipients.
    Flat,
    /// Group, sort, sequence and re-linearize.
    #[default]
    Grouped,
}

/// Summary block ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumSummaryOrder {
    /// Order in which products first appear in the output.
    #[default]
    FirstSeen,
    /// Sorted by product text.
    ByProduct,
}

/// Dedup key used by the duplicate-recipient highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumDedupKeyRule {
    /// Trimmed recipient text.
    Recipient,
    /// Trimmed recipient plus trimmed phone text.
    RecipientPhone,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TransformModels

/// Non-empty run of rows sharing one trimmed recipient key.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGroup {
    /// Trimmed recipient text.
    pub key: String,
    /// Member rows in current order.
    pub rows: Vec<SpecRow>,
}

/// Per-product quantity total.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSummaryEntry {
    /// Trimmed product name.
    pub product: String,
    /// Sum of parsed quantities; unparseable values count as 0.
    pub total: f64,
}

/// One emitted body row: a data row or a separator marker.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumBodyRow {
    Data(SpecRow),
    Separator,
}

/// Flattened body with separator positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecLinearized {
    /// Body rows in output order.
    pub rows: Vec<EnumBodyRow>,
    /// Positions of separators within `rows`.
    pub idx_separators: Vec<usize>,
}

impl SpecLinearized {
    /// Data rows in output order.
    pub fn data_rows(&self) -> impl Iterator<Item = &SpecRow> {
        self.rows.iter().filter_map(|row| match row {
            EnumBodyRow::Data(row) => Some(row),
            EnumBodyRow::Separator => None,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Full transform configuration. Build from a variant with
/// [`SpecTransformOptions::from_variant`] and refine with a
/// [`SpecTransformOptionsPatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTransformOptions {
    /// Naming variant.
    pub variant: EnumSheetVariant,
    /// Output sheet name.
    pub sheet_name: String,
    /// Banner rows above the header.
    pub n_rows_skip: usize,
    /// `(source position, output name)` projection; empty keeps all columns.
    pub cols_projection: Vec<(usize, String)>,

    pub rule_layout: EnumLayoutRule,
    pub rule_group: EnumGroupRule,
    /// Recipient column (after projection).
    pub col_recipient: usize,
    /// Product column (after projection).
    pub col_product: usize,
    /// Quantity column (after projection).
    pub col_quantity: usize,
    /// Phone column, needed by [`EnumDedupKeyRule::RecipientPhone`].
    pub col_phone: Option<usize>,

    /// Columns checked by the quantity threshold highlight.
    pub cols_threshold: Vec<usize>,
    /// Inclusive threshold for the attention fill.
    pub n_threshold: f64,
    /// Duplicate-recipient highlight; `None` disables it.
    pub rule_dedup: Option<EnumDedupKeyRule>,

    pub rule_summary_order: EnumSummaryOrder,
    /// Blank rows between the body and the summary block.
    pub n_rows_summary_gap: usize,

    /// Fixed column widths; other columns are autofit.
    pub widths_by_col: BTreeMap<usize, f64>,
    pub height_separator: f64,
    pub height_summary: f64,
    /// Freeze the header row.
    pub if_freeze_header: bool,
}

impl Default for SpecTransformOptions {
    fn default() -> Self {
        derive_variant_options(EnumSheetVariant::Result)
    }
}

impl SpecTransformOptions {
    /// Preset for `variant`.
    pub fn from_variant(variant: EnumSheetVariant) -> Self {
        derive_variant_options(variant)
    }

    /// Preset for `variant`, else the patch's own `variant`, else `Result`;
    /// then `patch` is overlaid.
    pub fn from_patch(
        variant: Option<EnumSheetVariant>,
        patch: SpecTransformOptionsPatch,
    ) -> Self {
        let variant = variant.or(patch.variant).unwrap_or_default();
        Self::from_variant(variant).with_patch(patch)
    }

    /// Overlay every field set in `patch`.
    pub fn with_patch(mut self, patch: SpecTransformOptionsPatch) -> Self {
        if let Some(val) = patch.sheet_name {
            self.sheet_name = val;
        }
        if let Some(val) = patch.n_rows_skip {
            self.n_rows_skip = val;
        }
        if let Some(val) = patch.cols_projection {
            self.cols_projection = val;
        }
        if let Some(val) = patch.rule_layout {
            self.rule_layout = val;
        }
        if let Some(val) = patch.rule_group {
            self.rule_group = val;
        }
        if let Some(val) = patch.col_recipient {
            self.col_recipient = val;
        }
        if let Some(val) = patch.col_product {
            self.col_product = val;
        }
        if let Some(val) = patch.col_quantity {
            self.col_quantity = val;
        }
        if let Some(val) = patch.col_phone {
            self.col_phone = Some(val);
        }
        if let Some(val) = patch.cols_threshold {
            self.cols_threshold = val;
        }
        if let Some(val) = patch.n_threshold {
            self.n_threshold = val;
        }
        if let Some(val) = patch.rule_dedup {
            self.rule_dedup = Some(val);
        }
        if patch.if_disable_dedup.unwrap_or(false) {
            self.rule_dedup = None;
        }
        if let Some(val) = patch.rule_summary_order {
            self.rule_summary_order = val;
        }
        if let Some(val) = patch.n_rows_summary_gap {
            self.n_rows_summary_gap = val;
        }
        if let Some(val) = patch.widths_by_col {
            self.widths_by_col = val;
        }
        if let Some(val) = patch.height_separator {
            self.height_separator = val;
        }
        if let Some(val) = patch.height_summary {
            self.height_summary = val;
        }
        if let Some(val) = patch.if_freeze_header {
            self.if_freeze_header = val;
        }
        self
    }
}

/// Partial [`SpecTransformOptions`] read from a TOML config file.
///
/// ```toml
/// variant = "form"
/// n_threshold = 3
/// cols_threshold = [4]
/// rule_dedup = "recipient"
///
/// [widths_by_col]
/// 3 = 60.0
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecTransformOptionsPatch {
    pub variant: Option<EnumSheetVariant>,
    pub sheet_name: Option<String>,
    pub n_rows_skip: Option<usize>,
    pub cols_projection: Option<Vec<(usize, String)>>,
    pub rule_layout: Option<EnumLayoutRule>,
    pub rule_group: Option<EnumGroupRule>,
    pub col_recipient: Option<usize>,
    pub col_product: Option<usize>,
    pub col_quantity: Option<usize>,
    pub col_phone: Option<usize>,
    pub cols_threshold: Option<Vec<usize>>,
    pub n_threshold: Option<f64>,
    pub rule_dedup: Option<EnumDedupKeyRule>,
    pub if_disable_dedup: Option<bool>,
    pub rule_summary_order: Option<EnumSummaryOrder>,
    pub n_rows_summary_gap: Option<usize>,
    #[serde(deserialize_with = "deserialize_widths_by_col")]
    pub widths_by_col: Option<BTreeMap<usize, f64>>,
    pub height_separator: Option<f64>,
    pub height_summary: Option<f64>,
    pub if_freeze_header: Option<bool>,
}

impl SpecTransformOptionsPatch {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// TOML table keys are strings; accept `"3" = 60.0` style column keys.
fn deserialize_widths_by_col<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<usize, f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let dict_raw: Option<BTreeMap<String, f64>> = Option::deserialize(deserializer)?;
    let Some(dict_raw) = dict_raw else {
        return Ok(None);
    };
    let mut dict_widths = BTreeMap::new();
    for (c_key, n_width) in dict_raw {
        let n_idx_col = c_key.trim().parse::<usize>().map_err(|_| {
            serde::de::Error::custom(format!("column key '{c_key}' is not an index"))
        })?;
        dict_widths.insert(n_idx_col, n_width);
    }
    Ok(Some(dict_widths))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Results

/// Counts gathered while processing one workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecProcessReport {
    pub n_rows_loaded: usize,
    pub n_rows_data: usize,
    pub n_rows_dropped: usize,
    pub n_groups: usize,
    pub n_separators: usize,
    pub n_summary_entries: usize,
    pub n_cells_threshold: usize,
    pub n_rows_duplicate: usize,
    /// Writer report.
    pub xlsx: SpecXlsxReport,
}

/// Output of [`crate::pipeline::process_workbook`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecProcessedWorkbook {
    /// Download file name.
    pub filename: String,
    /// xlsx bytes.
    pub bytes: Vec<u8>,
    pub report: SpecProcessReport,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_from_str_accepts_english_and_korean() {
        assert_eq!("form".parse::<EnumSheetVariant>(), Ok(EnumSheetVariant::Form));
        assert_eq!(" 결과 ".parse::<EnumSheetVariant>(), Ok(EnumSheetVariant::Result));
        assert!("other".parse::<EnumSheetVariant>().is_err());
    }

    #[test]
    fn test_patch_from_toml_overlays_only_given_fields() {
        let patch = SpecTransformOptionsPatch::from_toml_str(
            r#"
            n_threshold = 3.0
            rule_dedup = "recipient"
            cols_projection = [[0, "id"], [2, "name"]]

            [widths_by_col]
            3 = 60.0
            "#,
        )
        .unwrap();

        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Result).with_patch(patch);
        assert_eq!(options.n_threshold, 3.0);
        assert_eq!(options.rule_dedup, Some(EnumDedupKeyRule::Recipient));
        assert_eq!(
            options.cols_projection,
            vec![(0, "id".to_string()), (2, "name".to_string())]
        );
        assert_eq!(options.widths_by_col, BTreeMap::from([(3, 60.0)]));
        assert_eq!(options.col_recipient, 1);
    }

    #[test]
    fn test_patch_rejects_unknown_keys_and_bad_width_keys() {
        assert!(SpecTransformOptionsPatch::from_toml_str("no_such_field = 1").is_err());
        assert!(SpecTransformOptionsPatch::from_toml_str("[widths_by_col]\nC = 10.0").is_err());
    }

    #[test]
    fn test_patch_can_disable_dedup() {
        let patch = SpecTransformOptionsPatch {
            if_disable_dedup: Some(true),
            ..Default::default()
        };
        let options = SpecTransformOptions::from_variant(EnumSheetVariant::Form).with_patch(patch);
        assert_eq!(options.rule_dedup, None);
    }

    #[test]
    fn test_explicit_variant_beats_patch_variant() {
        let patch = SpecTransformOptionsPatch::from_toml_str("variant = \"form\"").unwrap();

        let options =
            SpecTransformOptions::from_patch(Some(EnumSheetVariant::Result), patch.clone());
        assert_eq!(options.variant, EnumSheetVariant::Result);
        assert_eq!(
            SpecTransformOptions::from_patch(None, patch).variant,
            EnumSheetVariant::Form
        );
        assert_eq!(
            SpecTransformOptions::from_patch(None, SpecTransformOptionsPatch::default()).variant,
            EnumSheetVariant::Result
        );
    }
}
