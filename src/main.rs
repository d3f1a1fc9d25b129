use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use soccer_scraper::config::ScraperConfig;
use soccer_scraper::http_client::{DirFetcher, HttpFetcher, PageSession};
use soccer_scraper::pacing::PacingPolicy;
use soccer_scraper::pipeline::{Pipeline, RunSummary};
use soccer_scraper::sink::{FileExportSink, SqliteSink};
use soccer_scraper::store;

const DEFAULT_LOG_FILTER: &str = "soccer_scraper=info,warn";

#[derive(Debug, Default)]
struct CliArgs {
    db: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    import: Option<PathBuf>,
    pages_dir: Option<PathBuf>,
    parallel: Option<usize>,
    dry_run: bool,
    no_export: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    match run() {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run() -> Result<RunSummary> {
    let args = parse_args(std::env::args().skip(1).collect());
    let mut config = ScraperConfig::from_env();
    if let Some(dir) = args.data_dir.clone() {
        config.data_dir = dir;
    }
    if let Some(parallel) = args.parallel {
        config.parallelism = parallel.clamp(1, 8);
    }

    let db_path = args
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;

    if let Some(path) = &args.import {
        let matches = store::read_matches_json(path)?;
        let n = store::upsert_matches(&mut conn, &matches)?;
        println!("Imported {n} matches from {}", path.display());
    }

    let mut pipeline = Pipeline::new(&config);
    if !args.dry_run {
        pipeline = pipeline.with_sink(SqliteSink::new(&conn));
        if !args.no_export {
            pipeline = pipeline.with_sink(FileExportSink::new(config.data_dir.clone()));
        }
    }

    let summary = match &args.pages_dir {
        Some(dir) => {
            let retry = config.retry;
            pipeline.run(&conn, || {
                Ok(PageSession::new(
                    DirFetcher::new(dir),
                    PacingPolicy::disabled(),
                    retry,
                ))
            })?
        }
        None => pipeline.run(&conn, || PageSession::<HttpFetcher>::open(&config))?,
    };

    print_summary(&db_path, &summary);
    Ok(summary)
}

fn print_summary(db_path: &std::path::Path, summary: &RunSummary) {
    println!("Match statistics run complete");
    println!("DB: {}", db_path.display());
    println!(
        "Fixtures: {}/{} aggregated",
        summary.aggregated, summary.fixtures
    );
    println!("Records saved: {}", summary.records_saved);
    println!(
        "No history: {}  Every fetch failed: {}",
        summary.no_history, summary.fully_failed
    );
    if !summary.failures.is_empty() {
        println!("  errors: {}", summary.failures.len());
        for err in summary.failures.iter().take(10) {
            println!("   - {err}");
        }
    }
    if let Some(err) = &summary.halted {
        println!("Halted: {err}");
    }
}

fn parse_args(args: Vec<String>) -> CliArgs {
    let mut out = CliArgs::default();
    let mut idx = 0;
    while idx < args.len() {
        let arg = args[idx].as_str();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.trim().to_string())),
            None => (arg, None),
        };
        let takes_value = matches!(
            flag,
            "--db" | "--data-dir" | "--import" | "--pages-dir" | "--parallel"
        );
        let value = if takes_value && inline.is_none() {
            idx += 1;
            args.get(idx).map(|v| v.trim().to_string())
        } else {
            inline
        };
        let value = value.filter(|v| !v.is_empty());

        match flag {
            "--db" => out.db = value.map(PathBuf::from),
            "--data-dir" => out.data_dir = value.map(PathBuf::from),
            "--import" => out.import = value.map(PathBuf::from),
            "--pages-dir" => out.pages_dir = value.map(PathBuf::from),
            "--parallel" => out.parallel = value.and_then(|v| v.parse::<usize>().ok()),
            "--dry-run" => out.dry_run = true,
            "--no-export" => out.no_export = true,
            other => eprintln!("ignoring unknown argument {other}"),
        }
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::parse_args;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_accept_both_value_forms() {
        let parsed = parse_args(args(&[
            "--db=/tmp/x.sqlite",
            "--data-dir",
            "out",
            "--parallel=3",
            "--dry-run",
        ]));
        assert_eq!(parsed.db, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(parsed.data_dir, Some(PathBuf::from("out")));
        assert_eq!(parsed.parallel, Some(3));
        assert!(parsed.dry_run);
        assert!(!parsed.no_export);
    }

    #[test]
    fn missing_values_are_ignored() {
        let parsed = parse_args(args(&["--import"]));
        assert!(parsed.import.is_none());
    }
}
