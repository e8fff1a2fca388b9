use orderkit_sheet::{
    EnumSheetVariant, ProcessSheetError, SpecTransformOptions, SpecTransformOptionsPatch,
    derive_output_filename, process_workbook as rs_process_workbook,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "orderkit.sheet.process.v1";

/// Transform an uploaded order workbook.
///
/// Returns `(download_name, xlsx_bytes)`. An explicit `variant` wins over the
/// one in `config_toml`; without either the `result` preset is used. Wrong
/// passwords, unreadable files and bad options raise `ValueError`; other
/// failures raise `RuntimeError`.
#[pyfunction]
#[pyo3(signature = (data, filename, password = None, variant = None, config_toml = None))]
fn process_workbook<'py>(
    py: Python<'py>,
    data: &[u8],
    filename: &str,
    password: Option<&str>,
    variant: Option<&str>,
    config_toml: Option<&str>,
) -> PyResult<(String, Bound<'py, PyBytes>)> {
    let options = derive_transform_options(variant, config_toml)?;

    let processed = py
        .allow_threads(|| rs_process_workbook(data, filename, password, &options))
        .map_err(convert_process_error)?;

    Ok((processed.filename, PyBytes::new(py, &processed.bytes)))
}

/// Download name for `filename` under `variant`.
#[pyfunction]
#[pyo3(signature = (filename, variant = "result"))]
fn output_filename(filename: &str, variant: &str) -> PyResult<String> {
    Ok(derive_output_filename(filename, parse_variant(variant)?))
}

fn parse_variant(value: &str) -> PyResult<EnumSheetVariant> {
    value.parse::<EnumSheetVariant>().map_err(PyValueError::new_err)
}

fn derive_transform_options(
    variant: Option<&str>,
    config_toml: Option<&str>,
) -> PyResult<SpecTransformOptions> {
    let variant = variant.map(parse_variant).transpose()?;
    let patch = match config_toml {
        Some(text) => SpecTransformOptionsPatch::from_toml_str(text)
            .map_err(|err| PyValueError::new_err(format!("Invalid config: {err}")))?,
        None => SpecTransformOptionsPatch::default(),
    };
    Ok(SpecTransformOptions::from_patch(variant, patch))
}

fn convert_process_error(err: ProcessSheetError) -> PyErr {
    if err.is_input_error() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

#[pymodule]
fn _orderkit_sheet_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(process_workbook, module)?)?;
    module.add_function(wrap_pyfunction!(output_filename, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    Ok(())
}
