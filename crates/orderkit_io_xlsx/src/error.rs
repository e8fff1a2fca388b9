//! Error taxonomy for the decrypt/load/export stages.

use thiserror::Error;

/// Hard failures raised by workbook IO.
///
/// Numeric parse failures are never reported here; they degrade to
/// zero/no-highlight in the transform layer.
#[derive(Debug, Error)]
pub enum XlsxIoError {
    /// Encrypted container was given without a password.
    #[error("workbook is password-protected; a password is required")]
    PasswordRequired,
    /// Password did not pass the verifier check.
    #[error("wrong password")]
    WrongPassword,
    /// Encrypted container is structurally broken or uses an unsupported scheme.
    #[error("corrupt file: {0}")]
    CorruptFile(String),
    /// Bytes could not be parsed as a workbook.
    #[error("unreadable format: {0}")]
    UnreadableFormat(String),
    /// Column projection requested an index beyond the source width.
    #[error("column index {idx_max} out of range (table has {width} columns)")]
    ColumnIndexOutOfRange {
        /// Largest requested zero-based index.
        idx_max: usize,
        /// Source table width.
        width: usize,
    },
    /// Workbook serialization failed.
    #[error("xlsx write error: {0}")]
    Export(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
