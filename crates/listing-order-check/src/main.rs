//! listing-order-check — entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use listing_order::ScanMode;

use listing_order_check::config::{CheckConfig, ConfigOverrides, Engine};
use listing_order_check::page::WaitPolicy;
use listing_order_check::report::RunFailure;
use listing_order_check::{runner, CheckError};

/// Exit status when the listing was read but is not ordered newest first.
const EXIT_UNSORTED: i32 = 2;
/// Exit status when the run itself failed.
const EXIT_ERROR: i32 = 1;

#[derive(Parser)]
#[command(
    name = "listing-order-check",
    about = "Verify that a live web listing is ordered newest first",
    version,
    after_help = "Settings also read LISTING_CHECK_* environment variables; flags win."
)]
struct Cli {
    /// Listing URL to check.
    #[arg(long)]
    url: Option<String>,

    /// Show the browser window instead of running headless.
    #[arg(long, overrides_with = "headless")]
    headed: bool,

    /// Run the browser without a window (the default).
    #[arg(long, overrides_with = "headed")]
    headless: bool,

    /// Total navigation attempts before giving up.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Delay after the first failed navigation; doubles per retry.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Number of items to check.
    #[arg(long)]
    limit: Option<usize>,

    /// Directory for failure screenshots.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Browser viewport as WIDTHxHEIGHT.
    #[arg(long)]
    viewport: Option<String>,

    /// Page fetcher to use.
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    /// Navigation timeout per attempt.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// When a navigation counts as loaded.
    #[arg(long, value_enum)]
    wait: Option<WaitPolicy>,

    /// Only read the first page of the listing.
    #[arg(long)]
    no_paginate: bool,

    /// Maximum listing pages to visit.
    #[arg(long)]
    max_pages: Option<usize>,

    /// Report every inversion instead of stopping at the first.
    #[arg(long)]
    all_inversions: bool,

    /// CSS selector matching one element per item.
    #[arg(long)]
    item_selector: Option<String>,

    /// CSS selector for the title, inside the item.
    #[arg(long)]
    title_selector: Option<String>,

    /// CSS selector for the time label, inside the item's next sibling.
    #[arg(long)]
    age_selector: Option<String>,

    /// CSS selector for the next-page link.
    #[arg(long)]
    more_selector: Option<String>,

    /// Output the report as JSON.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

impl Cli {
    /// Settings given explicitly on the command line.
    fn overrides(&self) -> ConfigOverrides {
        let headless = if self.headed {
            Some(false)
        } else if self.headless {
            Some(true)
        } else {
            None
        };
        ConfigOverrides {
            url: self.url.clone(),
            headless,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_delay_ms,
            item_limit: self.limit,
            artifact_dir: self.artifact_dir.clone(),
            viewport: self.viewport.clone(),
            timeout_ms: self.timeout_ms,
            wait_policy: self.wait,
            engine: self.engine,
            follow_pages: self.no_paginate.then_some(false),
            max_pages: self.max_pages,
            scan_mode: self.all_inversions.then_some(ScanMode::Exhaustive),
            item_selector: self.item_selector.clone(),
            title_selector: self.title_selector.clone(),
            time_label_selector: self.age_selector.clone(),
            next_page_selector: self.more_selector.clone(),
        }
    }

    /// Environment-resolved configuration with flags applied on top.
    fn config(&self) -> Result<CheckConfig, CheckError> {
        CheckConfig::from_env()?.with_overrides(&self.overrides())
    }
}

fn print_failure(failure: &RunFailure, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&failure.to_json()).unwrap_or_default()
        );
    } else {
        eprint!("{}", failure.render_text());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(
            *shell,
            &mut cmd,
            "listing-order-check",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.config() {
        Ok(config) => config,
        Err(error) => {
            let failure = RunFailure {
                error,
                elapsed: std::time::Duration::ZERO,
                artifact: None,
            };
            print_failure(&failure, cli.json);
            std::process::exit(EXIT_ERROR);
        }
    };

    tracing::info!("checking {} (limit {})", config.url, config.item_limit);

    // Consistent exit codes: 0=sorted, 1=error, 2=not sorted
    match runner::run(&config).await {
        Ok(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
            if !report.passed() {
                std::process::exit(EXIT_UNSORTED);
            }
        }
        Err(failure) => {
            print_failure(&failure, cli.json);
            std::process::exit(EXIT_ERROR);
        }
    }

    Ok(())
}
