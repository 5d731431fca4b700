//! Draft whitelist generator for fail2ban mail jails
//!
//! One-shot batch job, intended to be invoked by logrotate before the
//! mail login log is rotated away.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;
use whitelist_core::{
    classify, ingest, report, AggregateStore, Config, ConfigLoader, EventExtractor,
    WhitelistError,
};

#[derive(Parser, Debug)]
#[command(name = "f2b-whitelist")]
#[command(about = "Derive a draft fail2ban ignoreip whitelist from successful mail logins")]
struct Args {
    /// Config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Mail login log to ingest (overrides config)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Whitelist database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Draft report output path (overrides config)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let env_filter = if args.verbose {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into())
    } else {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args) {
        // A concurrent run holds the store lock: clean exit, the scheduler
        // retries on the next rotation
        if err
            .downcast_ref::<WhitelistError>()
            .is_some_and(WhitelistError::is_retriable)
        {
            tracing::info!("{err:#}, retrying next cycle");
            std::process::exit(0);
        }

        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;

    let mut store = AggregateStore::open(&config.db_path)
        .with_context(|| format!("failed to open whitelist database {:?}", config.db_path))?;

    let cursor = store.cursor()?;
    let slice = ingest::read_from(&config.log_path, cursor)?;

    let extractor = EventExtractor::new();
    let (events, stats) = extractor.parse_lines(&slice.lines);
    tracing::debug!(
        lines = stats.lines_seen,
        events = stats.events,
        skipped = stats.skipped,
        "extracted login events"
    );

    let applied = store.merge(&events, slice.end_offset)?;
    tracing::info!(applied, cursor = slice.end_offset, "merged new login events");

    let decisions = classify(&store.all_counts()?);
    report::write_draft(&config.report_path, &decisions)?;
    tracing::info!(
        ips = decisions.len(),
        accepted = decisions.iter().filter(|d| d.verdict.is_accepted()).count(),
        path = %config.report_path.display(),
        "draft report written"
    );

    Ok(())
}

fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = ConfigLoader::load_or_default(args.config.clone())?;

    if let Some(log) = &args.log {
        config.log_path = log.clone();
    }
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if let Some(report) = &args.report {
        config.report_path = report.clone();
    }

    Ok(config)
}
