//! LiveFind command line.
//!
//! ```text
//! livefind [--data-dir DIR] <command>
//!
//!   index <DIR>                               index every supported file under DIR
//!   search <QUERY...> [--limit N] [--ext EXT] [--quick]
//!   stats                                     show engine and shard statistics
//!   optimize                                  optimize every shard database
//!   clear-cache                               empty the immediate and hot layers
//!   doctor                                    check the installation
//!   help                                      show this text
//! ```
//!
//! Logs are written to `<data_dir>/logs/livefind.log.<date>`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use livefind::config::{default_data_dir, DataLayout, LOG_FILE};
use livefind::indexer::ProgressTracker;
use livefind::search::parse_query;
use livefind::ui::results::{format_eta, format_size};
use livefind::{diagnostics, AppConfig, SearchEngine};

const USAGE: &str = "\
Usage: livefind [--data-dir DIR] <command>

Commands:
  index <DIR>                                  Index every supported file under DIR
  search <QUERY...> [--limit N] [--ext EXT] [--quick]
                                               Search document contents
  stats                                        Show engine and shard statistics
  optimize                                     Optimize every shard database
  clear-cache                                  Empty the immediate and hot layers
  doctor                                       Check the installation
  help                                         Show this text

Query syntax: words, \"quoted phrases\", ext:pdf, size:>1mb, path:reports";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Index(PathBuf),
    Search {
        query: String,
        limit: Option<usize>,
        ext: Option<String>,
        quick: bool,
    },
    Stats,
    Optimize,
    ClearCache,
    Doctor,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
struct Cli {
    data_dir: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut data_dir = None;
    let mut rest: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--data-dir" => {
                let dir = iter.next().ok_or("--data-dir needs a value")?;
                data_dir = Some(PathBuf::from(dir));
            }
            "-h" | "--help" => rest.insert(0, "help"),
            other => rest.push(other),
        }
    }

    let Some((&name, params)) = rest.split_first() else {
        return Err("missing command".to_string());
    };

    let command = match name {
        "index" => match params {
            [dir] => Command::Index(PathBuf::from(dir)),
            [] => return Err("index needs a directory".to_string()),
            _ => return Err("index takes exactly one directory".to_string()),
        },
        "search" => parse_search(params)?,
        "stats" => Command::Stats,
        "optimize" => Command::Optimize,
        "clear-cache" => Command::ClearCache,
        "doctor" => Command::Doctor,
        "help" => Command::Help,
        other => return Err(format!("unknown command '{}'", other)),
    };

    Ok(Cli { data_dir, command })
}

fn parse_search(params: &[&str]) -> Result<Command, String> {
    let mut words: Vec<&str> = Vec::new();
    let mut limit = None;
    let mut ext = None;
    let mut quick = false;

    let mut iter = params.iter();
    while let Some(&param) = iter.next() {
        match param {
            "--limit" => {
                let value = iter.next().ok_or("--limit needs a value")?;
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("invalid --limit '{}'", value))?;
                limit = Some(n);
            }
            "--ext" => {
                let value = iter.next().ok_or("--ext needs a value")?;
                ext = Some(value.to_string());
            }
            "--quick" => quick = true,
            word => words.push(word),
        }
    }

    if words.is_empty() {
        return Err("search needs a query".to_string());
    }

    Ok(Command::Search {
        query: words.join(" "),
        limit,
        ext,
        quick,
    })
}

/// Log to a daily file under the data directory.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(layout: &DataLayout, level: &str) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("livefind={}", level)))
    };
    let log_dir = layout.logs_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", log_dir, e);
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::WARN),
        )
        .init();

    tracing::info!("LiveFind v{} starting", env!("CARGO_PKG_VERSION"));
    Some(guard)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    if cli.command == Command::Help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config = AppConfig::load_or_default(&data_dir);
    let _guard = init_logging(&config.layout(), &config.log_level);

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &AppConfig) -> anyhow::Result<ExitCode> {
    if command == Command::Doctor {
        let report = diagnostics::run(config);
        println!("{}", report);
        return Ok(if report.is_healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let engine = SearchEngine::open(config)
        .with_context(|| format!("failed to open data directory {}", config.data_dir.display()))?;

    match command {
        Command::Index(dir) => index(&engine, &dir)?,
        Command::Search {
            query,
            limit,
            ext,
            quick,
        } => search(&engine, config, &query, limit, ext, quick)?,
        Command::Stats => stats(&engine),
        Command::Optimize => {
            let done = engine.optimize_databases();
            println!("Optimized {}/{} shards", done, engine.shard_count());
        }
        Command::ClearCache => {
            engine.clear_cache().context("failed to clear cache")?;
            println!("Cache cleared");
        }
        Command::Doctor | Command::Help => {}
    }

    engine.shutdown().context("failed to save caches")?;
    Ok(ExitCode::SUCCESS)
}

fn index(engine: &SearchEngine, dir: &std::path::Path) -> anyhow::Result<()> {
    let progress = ProgressTracker::new();
    let done = AtomicBool::new(false);

    let report = std::thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(500));
                let info = progress.snapshot();
                if info.total_files > 0 && !done.load(Ordering::SeqCst) {
                    eprint!(
                        "\r{:>5.1}% {}/{} files, {:.1}/s, {} left   ",
                        info.percent,
                        info.processed_files,
                        info.total_files,
                        info.files_per_second,
                        format_eta(info.estimated_remaining_secs)
                    );
                }
            }
        });

        let result = engine.index_directory(dir, &progress);
        done.store(true, Ordering::SeqCst);
        result
    });
    eprintln!();

    let report = report.with_context(|| format!("failed to index {}", dir.display()))?;
    engine.flush_pending().context("failed to persist indexed files")?;

    println!(
        "Indexed {}/{} files in {:.2}s ({:.1} files/s){}",
        report.success_count,
        report.total_files,
        report.elapsed_secs,
        report.files_per_second,
        if report.cancelled { ", cancelled" } else { "" }
    );
    Ok(())
}

fn search(
    engine: &SearchEngine,
    config: &AppConfig,
    input: &str,
    limit: Option<usize>,
    ext: Option<String>,
    quick: bool,
) -> anyhow::Result<()> {
    let parsed = parse_query(input)?;
    if parsed.text.trim().is_empty() {
        anyhow::bail!("query has no search words");
    }

    let limit = limit.unwrap_or(config.max_results);
    let ext = ext
        .or_else(|| parsed.extension().map(str::to_string))
        .unwrap_or_else(|| "all".to_string());

    let hits = engine.search_parsed(&parsed, limit, &ext, quick);

    for hit in &hits {
        println!("{:>8.2}  {:<16} {}", hit.score, hit.layer.to_string(), hit.file_path);
        let preview: String = hit.preview.split_whitespace().collect::<Vec<_>>().join(" ");
        if !preview.is_empty() {
            println!("          {}", livefind::text::safe_truncate(&preview, 120));
        }
    }
    println!("{} result(s)", hits.len());
    Ok(())
}

fn stats(engine: &SearchEngine) {
    let stats = engine.statistics();
    let opt = engine.optimization_statistics();
    let c = &stats.counters;

    println!("Shards:          {}/{} readable", stats.store.valid_shards, stats.store.shard_count);
    println!("Documents:       {}", stats.store.total_files);
    println!("Storage:         {}", format_size(stats.store.storage_bytes));
    for (file_type, count) in &stats.store.type_distribution {
        println!("  {:<14} {}", file_type, count);
    }
    println!(
        "Hot layer:       {} entries ({:.1} MB)",
        stats.cache.hot_entries, stats.cache.hot_mb
    );
    println!(
        "Immediate layer: {} entries ({:.1} MB)",
        stats.cache.immediate_entries, stats.cache.immediate_mb
    );
    println!("Pending jobs:    {}", stats.pending_jobs);
    println!("Worker threads:  {}", opt.worker_threads);
    println!(
        "Searches:        {} (avg {:.1}ms)",
        c.search_count,
        c.avg_search_secs * 1000.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_index() {
        let cli = parse_args(&args(&["--data-dir", "/tmp/lf", "index", "/docs"])).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/lf")));
        assert_eq!(cli.command, Command::Index(PathBuf::from("/docs")));
    }

    #[test]
    fn test_parse_search_options() {
        let cli = parse_args(&args(&["search", "annual", "report", "--limit", "5", "--quick"])).unwrap();
        assert_eq!(
            cli.command,
            Command::Search {
                query: "annual report".to_string(),
                limit: Some(5),
                ext: None,
                quick: true,
            }
        );
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["index"])).is_err());
        assert!(parse_args(&args(&["search"])).is_err());
        assert!(parse_args(&args(&["search", "x", "--limit", "many"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["--data-dir"])).is_err());
    }

    #[test]
    fn test_help_flag() {
        assert_eq!(parse_args(&args(&["--help"])).unwrap().command, Command::Help);
    }
}
