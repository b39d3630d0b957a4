pub mod models {
    pub mod reading;
}

pub mod config;
pub mod db {
    pub mod models;
}
pub mod pipeline {
    pub mod gapfill;
    pub mod normalize;
}
pub mod schema;
pub mod services {
    pub mod import;
    pub mod persist;
    pub mod query;
}

use crate::config::Config;
use crate::services::persist::PgRecordWriter;
use crate::services::{import, query};
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};
use std::path::{Path, PathBuf};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// What one invocation does: a single import run, a stored-record count, or
/// a listing of the most recent timeline entries.
#[derive(Debug)]
enum Mode {
    Import(PathBuf),
    Count,
    Tail(i64),
}

#[derive(Debug)]
struct CliArgs {
    env_file: Option<PathBuf>,
    mode: Mode,
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn run(mode: Mode) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (min_threshold={}, operating_load={}, data_min_period={}s, target_metric={}, merge_spans={})",
        cfg.min_threshold,
        cfg.operating_load,
        cfg.data_min_period.as_secs(),
        cfg.target_metric,
        cfg.merge_spans
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;

    // 4) Run the requested operation
    match mode {
        Mode::Count => {
            let count = query::count_records(&mut conn, &cfg.target_metric)?;
            info!("{} stored record(s) for metric {}", count, cfg.target_metric);
            println!("{count}");
        }
        Mode::Tail(limit) => {
            let records = query::recent_records(&mut conn, &cfg.target_metric, limit)?;
            for record in &records {
                println!(
                    "{}  {}  state={}  value={}",
                    record.time, record.device_id, record.state, record.value
                );
            }
            info!("{} recent record(s) for metric {}", records.len(), cfg.target_metric);
        }
        Mode::Import(path) => {
            let writer = PgRecordWriter::new(cfg.database_url.clone());
            let written = import::run_import(&cfg, &writer, &path).map_err(|e| e.to_string())?;
            info!("Import complete: {} record(s) written", written);
            println!("{written}");
        }
    }

    Ok(())
}

fn parse_cli() -> Result<CliArgs, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    let mut mode: Option<Mode> = None;

    fn set_mode(slot: &mut Option<Mode>, mode: Mode) -> Result<(), String> {
        if slot.is_some() {
            return Err("expected exactly one of `--import <csv-file>`, `--count`, or `--tail <n>`".to_string());
        }
        *slot = Some(mode);
        Ok(())
    }

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("--import") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--import` requires a csv file argument".to_string())?;
                set_mode(&mut mode, Mode::Import(PathBuf::from(value)))?;
            }
            Some(s) if s.starts_with("--import=") => {
                let path_str = &s["--import=".len()..];
                if path_str.is_empty() {
                    return Err("`--import` requires a csv file argument".to_string());
                }
                set_mode(&mut mode, Mode::Import(PathBuf::from(path_str)))?;
            }
            Some("--count") => {
                set_mode(&mut mode, Mode::Count)?;
            }
            Some("--tail") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--tail` requires a record count argument".to_string())?;
                let count = value
                    .to_str()
                    .and_then(|s| s.parse::<i64>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "`--tail` requires a positive record count".to_string())?;
                set_mode(&mut mode, Mode::Tail(count))?;
            }
            Some(s) if s.starts_with("--tail=") => {
                let count = s["--tail=".len()..]
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "`--tail` requires a positive record count".to_string())?;
                set_mode(&mut mode, Mode::Tail(count))?;
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    let mode = mode.ok_or_else(|| "expected exactly one of `--import <csv-file>`, `--count`, or `--tail <n>`".to_string())?;
    Ok(CliArgs { env_file, mode })
}

/// Load the explicit env file, or `.env` from the working directory when
/// present. Values already in the process environment are preserved.
fn configure_env(env_file: Option<PathBuf>) -> Result<Option<PathBuf>, String> {
    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        Ok(Some(path))
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            load_env_file(&default_path)?;
            Ok(Some(default_path))
        } else {
            Ok(None)
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        match parse_env_assignment(&line) {
            Ok(Some((key, value))) => {
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                return Err(format!("{}:{}: {}", path.display(), index + 1, e));
            }
        }
    }

    Ok(())
}

/// Parse one `KEY=value` line. Supports `export` prefixes, `#` comments, and
/// values wrapped in matching single or double quotes (no escape sequences).
fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let without_export = trimmed
        .strip_prefix("export ")
        .map(|s| s.trim_start())
        .unwrap_or(trimmed);

    let (key, value_part) = without_export
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw = value_part.trim();
    let value = if (raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"'))
        || (raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\''))
    {
        raw[1..raw.len() - 1].to_string()
    } else {
        // Unquoted values end at an inline comment.
        raw.split_once('#').map(|(v, _)| v).unwrap_or(raw).trim_end().to_string()
    };

    Ok(Some((key.to_string(), value)))
}

fn main() {
    let args = match parse_cli() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("fatal: {}", err);
            eprintln!("usage: crono-timescale [--env-file <path>] (--import <csv-file> | --count | --tail <n>)");
            std::process::exit(1);
        }
    };

    let loaded_env = match configure_env(args.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "crono-timescale {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(args.mode) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_env_assignment;

    #[test]
    fn parses_plain_assignment() {
        let parsed = parse_env_assignment("TARGET_METRIC=Iavg_A").expect("valid line");
        assert_eq!(parsed, Some(("TARGET_METRIC".to_string(), "Iavg_A".to_string())));
    }

    #[test]
    fn strips_quotes_and_export_prefix() {
        let parsed = parse_env_assignment("export DATABASE_URL=\"postgres://localhost/crono\"").expect("valid line");
        assert_eq!(
            parsed,
            Some(("DATABASE_URL".to_string(), "postgres://localhost/crono".to_string()))
        );
    }

    #[test]
    fn drops_inline_comment_on_unquoted_value() {
        let parsed = parse_env_assignment("DATA_MIN_PERIOD_SECS=30 # seconds").expect("valid line");
        assert_eq!(parsed, Some(("DATA_MIN_PERIOD_SECS".to_string(), "30".to_string())));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        assert_eq!(parse_env_assignment("# comment").expect("comment line"), None);
        assert_eq!(parse_env_assignment("   ").expect("blank line"), None);
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(parse_env_assignment("JUSTAKEY").is_err());
    }
}
