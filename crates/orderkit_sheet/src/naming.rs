//! Download file name derivation.

use std::sync::LazyLock;

use regex::Regex;

use crate::conf::C_FILENAME_FALLBACK;
use crate::spec::EnumSheetVariant;

static RE_DATE_DIGITS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d{8}").ok());

/// `<label>_<first 8-digit run>.xlsx`, or the fallback name when the upload
/// name has no such run.
pub fn derive_output_filename(name: &str, variant: EnumSheetVariant) -> String {
    let c_digits = RE_DATE_DIGITS
        .as_ref()
        .and_then(|re| re.find(name))
        .map(|found| found.as_str());

    match c_digits {
        Some(c_digits) => format!("{}_{c_digits}.xlsx", variant.label()),
        None => C_FILENAME_FALLBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_uses_first_eight_digit_run() {
        assert_eq!(
            derive_output_filename("report_20240115_v2.xlsx", EnumSheetVariant::Result),
            "결과_20240115.xlsx"
        );
        assert_eq!(
            derive_output_filename("주문_20231201_20240101.xls", EnumSheetVariant::Form),
            "양식_20231201.xlsx"
        );
        assert_eq!(
            derive_output_filename("123456789.xlsx", EnumSheetVariant::Form),
            "양식_12345678.xlsx"
        );
    }

    #[test]
    fn test_filename_falls_back_without_digits() {
        assert_eq!(
            derive_output_filename("report.xlsx", EnumSheetVariant::Result),
            "processed_excel.xlsx"
        );
        assert_eq!(
            derive_output_filename("2024-01-15.xlsx", EnumSheetVariant::Result),
            "processed_excel.xlsx"
        );
    }
}
