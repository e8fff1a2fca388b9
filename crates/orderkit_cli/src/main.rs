use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use orderkit_sheet::{
    EnumSheetVariant, SpecProcessedWorkbook, SpecTransformOptions, SpecTransformOptionsPatch,
    process_workbook,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Reshape an order spreadsheet: group by recipient, sort by product,
/// append product totals and highlight quantities.
#[derive(Debug, Parser)]
#[command(name = "orderkit", version)]
struct Args {
    /// Uploaded workbook (.xlsx, .xls or .ods; may be password-protected).
    input: PathBuf,

    /// Password of an encrypted workbook.
    #[arg(long)]
    password: Option<String>,

    /// Read the password from a file (trailing newlines are trimmed).
    #[arg(long, value_name = "PATH", conflicts_with = "password")]
    password_file: Option<PathBuf>,

    /// Output preset: `result` (결과) or `form` (양식). Overrides the config file.
    #[arg(long)]
    variant: Option<EnumSheetVariant>,

    /// TOML file overriding preset options.
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Directory for the derived output name.
    #[arg(long, value_name = "DIR", conflicts_with = "output")]
    output_dir: Option<PathBuf>,

    /// Exact output path.
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(path_out) => {
            println!("{}", path_out.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(n_verbose: u8) {
    let c_level = match n_verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(c_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<PathBuf> {
    let options = derive_options(args)?;
    let password = read_password(args)?;
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let filename = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let processed = process_workbook(&bytes, &filename, password.as_deref(), &options)?;
    write_output(args, &processed)
}

fn derive_options(args: &Args) -> Result<SpecTransformOptions> {
    let patch = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            SpecTransformOptionsPatch::from_toml_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => SpecTransformOptionsPatch::default(),
    };
    Ok(SpecTransformOptions::from_patch(args.variant, patch))
}

fn read_password(args: &Args) -> Result<Option<String>> {
    if let Some(password) = &args.password {
        return Ok(Some(password.clone()));
    }
    let Some(path) = &args.password_file else {
        return Ok(None);
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read password file {}", path.display()))?;
    Ok(Some(text.trim_end_matches(['\r', '\n']).to_string()))
}

/// Write only after the whole pipeline succeeded.
fn write_output(args: &Args, processed: &SpecProcessedWorkbook) -> Result<PathBuf> {
    let path_out = match (&args.output, &args.output_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => dir.join(&processed.filename),
        (None, None) => args
            .input
            .parent()
            .unwrap_or(Path::new("."))
            .join(&processed.filename),
    };
    if let Some(dir) = path_out.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(&path_out, &processed.bytes)
        .with_context(|| format!("failed to write {}", path_out.display()))?;

    let report = &processed.report;
    info!(
        path = %path_out.display(),
        n_rows_data = report.n_rows_data,
        n_separators = report.n_separators,
        n_summary_entries = report.n_summary_entries,
        "wrote output"
    );
    Ok(path_out)
}
