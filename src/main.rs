#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use onlyargs::CliError;
use onlyargs_derive::OnlyArgs;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::{env, process::ExitCode};
use taxfolio::engine::compute_tax;
use taxfolio::errors::TaxError;
use taxfolio::imports::{read_tables, TablePaths};
use taxfolio::methods;
use taxfolio::model::{ComputedData, Configuration};
use taxfolio::report::{BalanceWorksheet, GainLossWorksheet, YearlySummaryWorksheet};
use taxfolio::transform::transform;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - RUST_LOG controls log verbosity, e.g. RUST_LOG=debug"]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Read the RON configuration from this file.
    #[short('c')]
    config: PathBuf,

    /// Read the acquisitions (IN) table CSV from this file.
    #[long]
    input_in: PathBuf,

    /// Read the disposals (OUT) table CSV from this file.
    #[long]
    input_out: PathBuf,

    /// Read the transfers (INTRA) table CSV from this file.
    #[long]
    input_intra: PathBuf,

    /// Override the configuration's accounting method.
    #[short('m')]
    method: Option<String>,

    /// Write worksheet CSVs to this output directory.
    #[short('o')]
    output: Option<PathBuf>,

    /// Worksheet CSVs written to the output directory will be given
    ///   this prefix.
    #[short('p')]
    #[default("")]
    prefix: String,

    /// Print worksheets to stdout when no output directory is given.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("Unable to load configuration")]
    Configuration(#[from] taxfolio::errors::ConfigurationError),

    #[error("Unknown accounting method")]
    Method(#[from] taxfolio::errors::UnknownMethodError),

    #[error("Unable to import transaction tables")]
    Import(#[from] taxfolio::errors::ImportError),

    #[error("Unable to transform transactions")]
    Transform(#[from] taxfolio::errors::TransformError),

    #[error("{failed} of {total} assets failed")]
    Assets { failed: usize, total: usize },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    // `RUST_LOG` configures instrumentation, e.g. `RUST_LOG=debug cargo run`.
    // Debug level prints per-asset event and record counts.
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();
    let _ = tracing_log::LogTracer::init();

    match run(onlyargs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;

    let configuration = Configuration::from_path(&args.config)?;
    let method_name = args
        .method
        .as_deref()
        .unwrap_or_else(|| configuration.accounting_method())
        .to_owned();
    // Resolve once up front so a typo fails before any parsing work.
    methods::from_name(&method_name)?;
    debug!("accounting method: {method_name}");

    let transactions = read_tables(
        &configuration,
        &TablePaths {
            acquisitions: args.input_in,
            disposals: args.input_out,
            transfers: args.input_intra,
        },
    )?;
    let per_asset = transform(&configuration, transactions)?;

    // Assets are independent; compute them in parallel. A failed asset does
    // not stop the others.
    let results: Vec<(String, Result<ComputedData, TaxError>)> = per_asset
        .into_par_iter()
        .map(|input| {
            let asset = input.asset().to_owned();
            let method = methods::from_name(&method_name).expect("resolved above");
            let result = compute_tax(&configuration, method.as_ref(), input).map_err(TaxError::from);
            (asset, result)
        })
        .collect();

    let total = results.len();
    let mut failed = 0;
    for (asset, result) in results {
        match result {
            Ok(computed) => emit(&args.output, &args.prefix, args.verbose, &computed)?,
            Err(err) => {
                failed += 1;
                eprintln!("❌ {asset}: {err}");
                for source in err.sources().skip(1) {
                    eprintln!("     Caused by {source}");
                }
            }
        }
    }

    if failed > 0 {
        return Err(Error::Assets { failed, total });
    }
    Ok(())
}

fn emit(
    output: &Option<PathBuf>,
    prefix: &str,
    verbose: bool,
    computed: &ComputedData,
) -> Result<(), Error> {
    let asset = computed.asset();

    let summary = YearlySummaryWorksheet::new(computed);
    let gains = GainLossWorksheet::new(computed);
    let balances = BalanceWorksheet::new(computed);

    match output {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            write_worksheet(dir, &format!("{prefix}{asset}-gains.csv"), &gains)?;
            write_worksheet(dir, &format!("{prefix}{asset}-balances.csv"), &balances)?;
            write_worksheet(dir, &format!("{prefix}{asset}-summary.csv"), &summary)?;
            info!("{asset}: worksheets written to {}", dir.display());
        }
        None if verbose => {
            println!("=== {asset}: gain/loss ===\n{gains}");
            println!("=== {asset}: balances ===\n{balances}");
            println!("=== {asset}: yearly summary ===\n{summary}");
        }
        None => {
            info!(
                "{asset}: {records} gain/loss records, {accounts} accounts \
                 (use --verbose or --output to see worksheets)",
                records = computed.gain_losses().len(),
                accounts = computed.balances().len(),
            );
        }
    }

    Ok(())
}

fn write_worksheet(
    dir: &Path,
    name: &str,
    worksheet: &dyn std::fmt::Display,
) -> Result<(), Error> {
    let path = dir.join(name);
    let mut writer = BufWriter::new(File::create(&path)?);
    write!(writer, "{worksheet}")?;
    writer.flush()?;
    debug!("wrote {}", path.display());
    Ok(())
}
