use anyhow::Result;
use chrono::NaiveDateTime;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use snapforge::batch::{Batch, BatchOperation, BatchOperationResult};
use snapforge::catalog::Catalog;
use snapforge::config::Config;
use snapforge::exif;
use snapforge::handle::collect_handles;

#[derive(Parser, Debug)]
#[command(
    name = "snapforge",
    version,
    about = "Batch capture-date editor and PNG to JPEG converter"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Set the capture date on all inputs, e.g. "2021-06-05 10:20:30"
    #[arg(long = "set-date", value_name = "DATETIME")]
    set_date: Option<String>,

    /// Convert all PNG inputs to JPEG, retiring the originals
    #[arg(long)]
    convert: bool,

    /// JPEG quality for --convert (overrides the config value)
    #[arg(short, long, value_name = "0-100")]
    quality: Option<u8>,

    /// Display the capture date of each input and exit
    #[arg(long = "show-date")]
    show_date: bool,

    /// Catalog root directory (overrides the config value)
    #[arg(long = "catalog-root", value_name = "DIR")]
    catalog_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let config = Config::load(cli.config.as_deref())?;
    let items = collect_handles(&cli.paths);
    if items.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    // Handle --show-date
    if cli.show_date {
        for handle in &items {
            match exif::get_capture_date(handle) {
                Some(when) => println!("{}: {}", handle.display_name(), when.format("%Y-%m-%d %H:%M:%S")),
                None => println!("{}: Not set", handle.display_name()),
            }
        }
        return Ok(());
    }

    let operation = match (&cli.set_date, cli.convert) {
        (Some(raw), false) => BatchOperation::SetCaptureDate(parse_cli_datetime(raw)?),
        (None, true) => BatchOperation::TranscodeToJpeg {
            quality: cli.quality.unwrap_or(config.transcode.quality),
        },
        (Some(_), true) => anyhow::bail!("--set-date and --convert are mutually exclusive."),
        (None, false) => anyhow::bail!("Nothing to do: pass --set-date, --convert, or --show-date."),
    };

    let catalog_root = cli
        .catalog_root
        .unwrap_or_else(|| config.catalog_root());
    let catalog = Arc::new(Catalog::new(catalog_root));

    let mut task = Batch { items, operation, catalog }.spawn();
    while let Some(p) = task.progress.recv().await {
        println!("[{}/{}] {}", p.index, p.total, p.name);
    }
    let result = task.join().await;
    print_summary(&result);

    if result.failure_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_cli_datetime(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| anyhow::anyhow!("Invalid date-time \"{raw}\" (expected YYYY-MM-DD HH:MM:SS)"))
}

fn print_summary(result: &BatchOperationResult) {
    println!(
        "\nDone: {} succeeded, {} failed",
        result.success_count, result.failure_count
    );
    for name in &result.failed_images {
        println!("  FAILED  {name}: {}", result.error_messages[name]);
    }
    for (name, message) in &result.warnings {
        println!("  WARNING {name}: {message}");
    }
}
