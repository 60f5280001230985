mod console;

use std::fmt;
use std::sync::Arc;

use chrono_tz::Tz;
use listen_core::model::{AdminId, parse_timezone};
use services::{AppServices, Clock, EngineConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

use console::{Command, ConsoleTransport};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingManifest,
    UnknownArg(String),
    InvalidOwner { raw: String },
    InvalidDbUrl { raw: String },
    InvalidTimezone { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingManifest => write!(f, "import requires a manifest path"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidOwner { raw } => write!(f, "invalid --owner value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTimezone { raw } => write!(f, "invalid --tz value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- serve  [--db <sqlite_url>] [--tz <zone>]");
    eprintln!("  cargo run -p app -- import <manifest.json> [--owner <admin_id>] [--db <sqlite_url>]");
    eprintln!("                                              [--tz <zone>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://listen.sqlite3");
    eprintln!("  --owner 1");
    eprintln!("  --tz Europe/Kyiv (timezone of imported decks without one)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LISTEN_DB_URL, LISTEN_DEFAULT_TZ, LISTEN_TRIGGER_TIME, LISTEN_NEW_PER_DAY,");
    eprintln!("  LISTEN_AUTO_ADVANCE_MS, LISTEN_CATCH_UP_ON_START, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Serve,
    Import { manifest: String, owner: AdminId },
}

struct Args {
    db_url: Option<String>,
    timezone: Option<Tz>,
    mode: Mode,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mode_arg = args.next();
        let mut manifest = None;
        let mut owner = AdminId::new(1);
        let mut db_url = None;
        let mut timezone = None;

        let import = match mode_arg.as_deref() {
            None | Some("serve") => false,
            Some("import") => true,
            Some("--help" | "-h") => return Ok(None),
            Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--tz" => {
                    let value = require_value(&mut args, "--tz")?;
                    let tz = parse_timezone(&value)
                        .map_err(|_| ArgsError::InvalidTimezone { raw: value.clone() })?;
                    timezone = Some(tz);
                }
                "--owner" if import => {
                    let value = require_value(&mut args, "--owner")?;
                    owner = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidOwner { raw: value.clone() })?;
                }
                "--help" | "-h" => return Ok(None),
                path if import && manifest.is_none() && !path.starts_with("--") => {
                    manifest = Some(path.to_string());
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let mode = if import {
            Mode::Import {
                manifest: manifest.ok_or(ArgsError::MissingManifest)?,
                owner,
            }
        } else {
            Mode::Serve
        };
        Ok(Some(Self {
            db_url,
            timezone,
            mode,
        }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn serve(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = services.scheduler();
    scheduler.start_all().await?;
    console::print_commands();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match console::dispatch(services, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("{e}"),
        }
    }

    scheduler.shutdown();
    log::info!("bye");
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e.into());
        }
    };

    let mut config = EngineConfig::from_env()?;
    config.database_url = normalize_sqlite_url(parsed.db_url.unwrap_or(config.database_url));
    if let Some(tz) = parsed.timezone {
        config.default_timezone = tz;
    }

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.database_url)?;
    let services =
        AppServices::new_sqlite(config, Clock::default_clock(), Arc::new(ConsoleTransport)).await?;

    match parsed.mode {
        Mode::Serve => serve(&services).await,
        Mode::Import { manifest, owner } => {
            let imported = console::import_manifest(&services, &manifest, owner).await;
            services.scheduler().shutdown();
            imported
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("{err}");
        eprintln!("{err}");
        std::process::exit(2);
    }
}
