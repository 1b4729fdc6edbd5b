//! cache-sweep CLI
//!
//! Entry point for the `cache-sweep` command-line tool.

use std::path::PathBuf;
use std::process;

use cache_sweep::logging::{init_logging, LogFormat, LoggingConfig};
use cache_sweep::{run_sweep, EffectiveConfig};
use clap::Parser;
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "cache-sweep")]
#[command(about = "Delete cache entries not used since a deadline", version)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Entries last used before this instant (epoch milliseconds) are deleted
    #[arg(allow_negative_numbers = true)]
    deadline: i64,

    /// Directory holding the cache roots (default: ~/.gradle/caches)
    #[arg(long)]
    caches_dir: Option<PathBuf>,

    /// Access journal (default: <caches-dir>/journal-1/file-access.json)
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Scan threads per cache root
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Seconds to wait for a contended cache lock (0 waits forever)
    #[arg(long)]
    lock_timeout_seconds: Option<u64>,

    /// Length of jar cache entry names
    #[arg(long)]
    cache_key_length: Option<usize>,

    /// Path to config file (default: ~/.config/cache-sweep/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Plan and report without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

impl Cli {
    /// Flags given on the command line, as the top configuration layer.
    fn overrides(&self) -> Value {
        let mut map = Map::new();
        if let Some(ref dir) = self.caches_dir {
            map.insert("caches_dir".to_string(), Value::from(dir.to_string_lossy().into_owned()));
        }
        if let Some(ref journal) = self.journal {
            map.insert(
                "journal_path".to_string(),
                Value::from(journal.to_string_lossy().into_owned()),
            );
        }
        if let Some(workers) = self.workers {
            map.insert("workers".to_string(), Value::from(workers));
        }
        if let Some(seconds) = self.lock_timeout_seconds {
            map.insert("lock_timeout_seconds".to_string(), Value::from(seconds));
        }
        if let Some(length) = self.cache_key_length {
            map.insert("cache_key_length".to_string(), Value::from(length));
        }
        if self.dry_run {
            map.insert("dry_run".to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LoggingConfig {
        format: cli.log_format,
        quiet: cli.quiet,
    }) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    if let Some(ref path) = cli.config {
        if !path.exists() {
            eprintln!("Config file not found: {}", path.display());
            process::exit(1);
        }
    }
    let config_path = cli.config.clone().or_else(EffectiveConfig::default_path);

    let effective = match EffectiveConfig::build(config_path.as_deref(), Some(cli.overrides())) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let report = match run_sweep(&effective, cli.deadline) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                process::exit(1);
            }
        }
    } else if cli.quiet {
        println!("{}", report.human_line());
    } else {
        println!("{}", report.to_human());
    }
}
