//! Pipeline error taxonomy.

use orderkit_io_xlsx::XlsxIoError;
use thiserror::Error;

/// Failure of [`crate::pipeline::process_workbook`].
#[derive(Debug, Error)]
pub enum ProcessSheetError {
    /// Decrypt, load, projection or export failure.
    #[error(transparent)]
    Io(#[from] XlsxIoError),
    /// Options inconsistent with themselves or with the loaded table.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl ProcessSheetError {
    /// `true` when the caller supplied bad input (password, file or options)
    /// rather than hitting an internal failure.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::InvalidOptions(_) => true,
            Self::Io(err) => !matches!(err, XlsxIoError::Export(_) | XlsxIoError::Io(_)),
        }
    }
}
