use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use rayon::prelude::*;

use xml_pool::cli::{AppConfig, Cli, OutputFormat};
use xml_pool::discovery::FileDiscovery;
use xml_pool::output::{FileReport, Output, RunReport};
use xml_pool::{ParseError, ParserPool, PoolError};

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses one file through the shared pool, folding open errors into the
/// parse-error taxonomy so the report can classify them as read failures.
fn parse_file(pool: &ParserPool, path: &Path) -> (Result<(), PoolError>, Duration) {
    let started = Instant::now();
    let result = match File::open(path) {
        Ok(file) => pool.parse_reader(file).map(|_document| ()),
        Err(err) => Err(PoolError::Parse(ParseError::Io(err))),
    };
    (result, started.elapsed())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = AppConfig::resolve(&cli).context("loading configuration")?;

    let pool = ParserPool::with_config(config.to_parser_config());
    pool.initialize().context("initializing parser pool")?;

    let files = FileDiscovery::new(config.files.extensions.clone())
        .discover(&cli.path)
        .with_context(|| format!("scanning {}", cli.path.display()))?;
    tracing::info!(count = files.len(), "discovered candidate files");

    let started = Instant::now();
    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(config.thread_count())
        .build()
        .context("building worker pool")?;
    let reports: Vec<FileReport> = workers.install(|| {
        files
            .par_iter()
            .map(|path| {
                let (result, duration) = parse_file(&pool, path);
                FileReport::from_result(path.clone(), &result, duration)
            })
            .collect()
    });

    let report = RunReport::new(reports, started.elapsed(), pool.stats());
    pool.destroy();

    let output = Output::new(cli.verbosity());
    match cli.format {
        OutputFormat::Human => print!("{}", output.format_report(&report)),
        OutputFormat::Summary => println!("{}", output.format_summary(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
