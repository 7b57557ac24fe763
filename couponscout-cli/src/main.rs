use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use couponscout::{
    search::{plan_chunks, Decision, Verdict},
    CancellationToken, ConfigOverrides, SearchConfig, SearchEngine,
};
use std::{num::NonZeroUsize, path::PathBuf, process::ExitCode, time::Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliCheckConfig {
    /// Coupon code to verify
    coupon: String,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coupon file to search (can be specified multiple times)
    #[arg(short = 'f', long = "file")]
    files: Vec<PathBuf>,

    /// Number of files the coupon must appear in
    #[arg(short = 'm', long = "min")]
    coupon_min: Option<usize>,

    /// Byte ranges read concurrently per file
    #[arg(short = 'p', long)]
    producers: Option<NonZeroUsize>,

    /// Line scanners per file
    #[arg(short = 'j', long)]
    consumers: Option<NonZeroUsize>,

    /// Upper bound on worker threads for the search
    #[arg(long)]
    max_workers: Option<NonZeroUsize>,

    /// Give up and reject the coupon after this long (e.g. 500ms, 2s)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a coupon code appears in enough coupon files
    Check(Box<CliCheckConfig>),

    /// Show how a file would be split between readers
    Plan {
        /// File to split
        file: PathBuf,

        /// Number of byte ranges
        #[arg(short = 'n', long, default_value = "4")]
        chunks: NonZeroUsize,
    },

    /// Load and validate the configuration
    ValidateConfig {
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => {
            let overrides = ConfigOverrides {
                coupon_files: args.files.clone(),
                coupon_min: args.coupon_min,
                producers_per_file: args.producers,
                consumers_per_file: args.consumers,
                max_workers: args.max_workers,
                log_level: args.log_level.clone(),
            };
            let config = load_config(args.config.as_deref(), overrides)?;
            init_logging(&config.log_level);
            debug!("Loaded configuration: {:?}", config);

            let engine = SearchEngine::new(config)?;
            let cancel = CancellationToken::new();
            let mut handle = engine.search(&args.coupon, &cancel)?;
            let verdict = match args.timeout {
                Some(timeout) => handle.evaluate_verdict_timeout(timeout)?,
                None => handle.evaluate_verdict()?,
            };

            if args.json {
                print_verdict_json(&args.coupon, &verdict)?;
            } else {
                print_verdict(&args.coupon, &verdict, engine.config().coupon_min);
            }

            let accepted = verdict.into_result()?;
            Ok(if accepted {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Commands::Plan { file, chunks } => {
            init_logging("warn");
            let ranges = plan_chunks(&file, chunks)
                .with_context(|| format!("failed to plan {}", file.display()))?;
            println!("{}", file.display().to_string().blue());
            for (i, range) in ranges.iter().enumerate() {
                println!(
                    "{}: [{}, {}) {} bytes",
                    i.to_string().green(),
                    range.start,
                    range.end,
                    range.len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ValidateConfig { config } => {
            let config = SearchConfig::load_from(config.as_deref())
                .context("failed to load configuration")?;
            init_logging(&config.log_level);
            config.validate()?;
            let workers = config.workers_per_search().min(config.max_workers.get());
            println!(
                "Configuration OK: {} coupon files, coupon_min {}, {} workers per search",
                config.coupon_files.len(),
                config.coupon_min,
                workers
            );
            for path in &config.coupon_files {
                println!("  {}", path.display().to_string().blue());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads the configuration files and applies command-line overrides. Coupon
/// files given on the command line are enough on their own.
fn load_config(
    path: Option<&std::path::Path>,
    overrides: ConfigOverrides,
) -> Result<SearchConfig> {
    match SearchConfig::load_from(path) {
        Ok(config) => Ok(config.merge_with_cli(overrides)),
        Err(_) if path.is_none() && !overrides.coupon_files.is_empty() => {
            let min = overrides.coupon_min.unwrap_or(1);
            Ok(SearchConfig::new(Vec::new(), min).merge_with_cli(overrides))
        }
        Err(e) => Err(e).context("failed to load configuration"),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_verdict(coupon: &str, verdict: &Verdict, coupon_min: usize) {
    let status = match (verdict.matched, verdict.decision) {
        (true, _) => "accepted".green().bold(),
        (false, Decision::Cancelled) => "rejected (search cancelled)".red().bold(),
        (false, _) => "rejected".red().bold(),
    };
    println!("Coupon {} {}", coupon, status);
    println!(
        "Found in {} of {} required files",
        verdict.matched_files.len(),
        coupon_min
    );
    for path in &verdict.matched_files {
        println!("  {}", path.display().to_string().blue());
    }
    for failure in &verdict.errors {
        println!("  {} {}", "failed:".yellow(), failure);
    }
}

fn print_verdict_json(coupon: &str, verdict: &Verdict) -> Result<()> {
    let output = serde_json::json!({
        "coupon": coupon,
        "accepted": verdict.matched,
        "decision": format!("{:?}", verdict.decision),
        "matched_files": verdict
            .matched_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>(),
        "errors": verdict
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>(),
        "stats": {
            "bytes_read": verdict.stats.bytes_read,
            "lines_compared": verdict.stats.lines_compared,
            "chunks_planned": verdict.stats.chunks_planned,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
