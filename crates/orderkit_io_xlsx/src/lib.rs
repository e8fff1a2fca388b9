//! `orderkit_io_xlsx` v1:
//! Workbook IO kernel for the order-sheet pipeline.
//!
//! Architecture:
//! - `conf`    : constants and default presets
//! - `spec`    : grid/style/report models and options
//! - `error`   : load/decrypt/export error taxonomy
//! - `util`    : pure helper functions
//! - `decrypt` : MS-OFFCRYPTO password decryption
//! - `reader`  : calamine loader and positional column selector
//! - `writer`  : pure-Rust xlsx writer kernel
pub mod conf;
pub mod decrypt;
pub mod error;
pub mod reader;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use decrypt::{decrypt_workbook_bytes, is_encrypted_package};
pub use error::XlsxIoError;
pub use reader::{
    derive_header_from_dataframe, derive_rows_from_dataframe, load_dataframe,
    select_columns_by_position,
};
pub use spec::{
    EnumCellValue, EnumSheetRowKind, SpecAutofitCellsPolicy, SpecCellFormat, SpecRow,
    SpecSheetGrid, SpecSheetRow, SpecSheetStyle, SpecSheetSummary, SpecXlsxReport,
    SpecXlsxValuePolicy, SpecXlsxWriteOptions,
};
pub use util::{
    convert_nan_inf_to_str, derive_cell_text, derive_date_num_format, derive_excel_date_text,
    derive_unique_column_names, estimate_width_len, is_blank, parse_number, sanitize_sheet_name,
};
pub use writer::XlsxWriter;
