use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use rule_validator::{Cli, Output, PropertiesLoader, Validator, VerbosityLevel};

/// Every document valid
const EXIT_VALID: u8 = 0;
/// At least one document invalid or unreadable
const EXIT_INVALID: u8 = 1;
/// Usage or setup error
const EXIT_SETUP: u8 = 2;

fn init_tracing(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbosity());

    match run(cli).await {
        Ok(true) => ExitCode::from(EXIT_VALID),
        Ok(false) => ExitCode::from(EXIT_INVALID),
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let properties = PropertiesLoader::load_properties(&cli)
        .await
        .context("Failed to load validator properties")?;
    debug!(data_dir = %properties.data_dir.display(), "properties loaded");

    let discovery = cli.discovery();
    let paths = cli.paths.clone();
    let files = tokio::task::spawn_blocking(move || discovery.discover_all(&paths))
        .await
        .context("File discovery task failed")?
        .context("Failed to discover input files")?;
    if files.is_empty() {
        anyhow::bail!("No files with extensions {:?} found", cli.get_extensions());
    }

    let validator = Arc::new(Validator::from_properties(properties)?);
    let results = validator
        .validate_files(files, &cli.run_options(), cli.get_thread_count())
        .await?;

    let output = Output::new(cli.format, cli.verbosity());
    println!("{}", output.format_results(&results)?.trim_end());

    Ok(results.all_valid())
}
