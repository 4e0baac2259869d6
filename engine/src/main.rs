//! netfanout - Entry Point
//!
//! Reads a JSON command batch, runs it against every listed device at once
//! and prints the per-device results as a JSON array on stdout.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, warn};

use netfanout::filesys::file::File;
use netfanout::logs::{init_logging, LogHandle, LogLevel, LogOptions};
use netfanout::storage::layout::StorageLayout;
use netfanout::storage::settings::Settings;
use netfanout::utils::version_info;
use netfanout::{BatchEngine, BatchKind, BatchResponse};

const USAGE: &str = "usage: netfanout --kind=display|configure [--input=<path>|-] \
[--config=<path>] [--log-level=<level>] [--log-dir=<path>] [--json-logs] [--version]";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Unable to render version info: {e}"),
        }
        return;
    }

    if cli_args.contains_key("help") {
        println!("{}", USAGE);
        return;
    }

    let layout = StorageLayout::default();
    let logging = match start_logging(&cli_args, &layout) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            std::process::exit(1);
        }
    };

    let code = match run(&cli_args, &layout, logging.as_ref()).await {
        Ok(true) => 0,
        Ok(false) => 2,
        Err(e) => {
            error!("netfanout failed: {e:#}");
            eprintln!("{} {e:#}", "error:".red().bold());
            1
        }
    };

    // Flush file logs before exiting
    drop(logging);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Start logging before anything else so settings loading is logged too
///
/// Logs go to stderr and to `--log-dir`, or the storage logs directory.
fn start_logging(
    cli_args: &HashMap<String, String>,
    layout: &StorageLayout,
) -> anyhow::Result<Option<LogHandle>> {
    let log_level = match cli_args.get("log-level") {
        Some(level) => level.parse::<LogLevel>().map_err(anyhow::Error::msg)?,
        None => LogLevel::default(),
    };
    let log_options = LogOptions {
        log_level,
        log_dir: Some(
            cli_args
                .get("log-dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| layout.logs_dir()),
        ),
        json_format: cli_args.contains_key("json-logs"),
        ..Default::default()
    };

    match init_logging(log_options) {
        Ok(handle) => Ok(Some(handle)),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            Ok(None)
        }
    }
}

/// Run one batch; `Ok(false)` means the batch was rejected
async fn run(
    cli_args: &HashMap<String, String>,
    layout: &StorageLayout,
    logging: Option<&LogHandle>,
) -> anyhow::Result<bool> {
    let kind: BatchKind = cli_args
        .get("kind")
        .map(String::as_str)
        .unwrap_or("display")
        .parse()
        .map_err(anyhow::Error::msg)?;

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let mut settings = Settings::load(&settings_file).await.with_context(|| {
        format!(
            "Unable to read settings file {}",
            settings_file.path().display()
        )
    })?;
    settings.apply_env();

    // The command line level wins over the settings file
    if !cli_args.contains_key("log-level") {
        if let Some(handle) = logging {
            if let Err(e) = handle.set_level(&settings.log_level) {
                warn!("Unable to apply log level from settings: {}", e);
            }
        }
    }

    let input = read_input(cli_args.get("input").map(String::as_str)).await?;

    let engine =
        BatchEngine::from_settings(&settings).context("Unable to build execution engine")?;
    info!("Running {} batch ({} bytes of input)", kind, input.len());
    let response = engine.execute_batch(input, kind).await;

    let mut rendered = serde_json::to_string_pretty(&response)?;
    rendered.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(rendered.as_bytes()).await?;
    stdout.flush().await?;

    print_summary(&response);
    Ok(!response.is_invalid())
}

/// Read the batch from a file, or from stdin when no path (or `-`) is given
async fn read_input(path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) if path != "-" => File::new(path)
            .read_bytes()
            .await
            .with_context(|| format!("Unable to read batch input {}", path)),
        _ => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Unable to read batch input from stdin")?;
            Ok(buf)
        }
    }
}

fn print_summary(response: &BatchResponse) {
    let Some(results) = response.results() else {
        let issues = response.issues().map_or(0, |issues| issues.len());
        eprintln!(
            "{} batch rejected with {} issue(s)",
            "invalid".red().bold(),
            issues
        );
        return;
    };

    let ok = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - ok;
    let line = format!("{}/{} devices succeeded", ok, results.len());
    if failed == 0 {
        eprintln!("{} {}", "done".green().bold(), line);
    } else {
        eprintln!(
            "{} {} ({} failed)",
            "done".yellow().bold(),
            line,
            failed.to_string().red()
        );
    }
}
