//! `orderkit_sheet` v1:
//! Order-sheet transform: recipient grouping, product totals and highlights.
//!
//! Architecture:
//! - `conf`      : colors, layout constants and variant presets
//! - `spec`      : transform models, options and results
//! - `error`     : pipeline error taxonomy
//! - `group`     : grouper, sorter, sequencer and re-linearizer
//! - `aggregate` : per-product quantity totals
//! - `highlight` : threshold and duplicate-recipient highlight plans
//! - `style`     : sheet style planner
//! - `naming`    : download file name
//! - `pipeline`  : end-to-end `process_workbook`
pub mod aggregate;
pub mod conf;
pub mod error;
pub mod group;
pub mod highlight;
pub mod naming;
pub mod pipeline;
pub mod spec;
pub mod style;

pub use aggregate::aggregate;
pub use error::ProcessSheetError;
pub use group::{group_rows, linearize, linearize_flat, sequence_groups, sort_group};
pub use highlight::{plan_duplicate_highlights, plan_threshold_highlights};
pub use naming::derive_output_filename;
pub use pipeline::{process_workbook, validate_options};
pub use spec::{
    EnumBodyRow, EnumDedupKeyRule, EnumGroupRule, EnumLayoutRule, EnumSheetVariant,
    EnumSummaryOrder, SpecGroup, SpecLinearized, SpecProcessReport, SpecProcessedWorkbook,
    SpecSummaryEntry, SpecTransformOptions, SpecTransformOptionsPatch,
};
pub use style::plan_sheet_style;

pub use orderkit_io_xlsx::{EnumCellValue, SpecRow, XlsxIoError, parse_number};
