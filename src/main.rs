use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backoffice_sim::cli::{Cli, Command};
use backoffice_sim::clock::FrozenClock;
use backoffice_sim::config::AppConfig;
use backoffice_sim::db::Database;
use backoffice_sim::session::{self, CallRecord, SessionData};
use backoffice_sim::suites::Suite;
use backoffice_sim::tools::{create_router, ToolRouter};
use backoffice_sim::types::ToolCall;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("backoffice_sim=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let mut config = AppConfig::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        return Ok(config);
    }
    // Auto-generate config file on first run
    let config_path = AppConfig::config_path()?;
    if !config_path.exists() {
        let path = AppConfig::save_default()?;
        info!(path = %path.display(), "created default config");
    }
    AppConfig::load()
}

fn load_database(path: Option<&Path>) -> Result<Database> {
    let Some(path) = path else {
        return Ok(Database::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed database: {}", path.display()))?;
    Database::from_json_str(&content)
        .with_context(|| format!("Failed to parse seed database: {}", path.display()))
}

fn write_database(db: &Database, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&db.to_value())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write database: {}", path.display()))?;
    info!(path = %path.display(), "database written");
    Ok(())
}

async fn run_session(
    router: &ToolRouter,
    db: &mut Database,
    transcript: &mut SessionData,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => {
                let result = session::run_call(router, db, &call);
                transcript.calls.push(CallRecord {
                    call,
                    result: result.clone(),
                });
                result
            }
            Err(e) => {
                warn!(error = %e, "unreadable tool call");
                json!({"success": false, "error": format!("Invalid tool call: {e}")}).to_string()
            }
        };
        stdout.write_all(result.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn replay_transcript(target: &str, db_override: Option<&Path>) -> Result<()> {
    let path = Path::new(target);
    let transcript = if path.exists() {
        session::import_session(path)?
    } else {
        session::load_session(target)?
    };
    let clock = FrozenClock::new(&transcript.clock)
        .with_context(|| format!("Invalid clock in transcript: {}", transcript.clock))?;
    let router = create_router(transcript.suite, clock);
    let mut db = load_database(db_override.or(transcript.seed.as_deref()))?;
    let diffs = session::replay(&transcript, &router, &mut db);
    for diff in &diffs {
        println!(
            "{}",
            json!({
                "index": diff.index,
                "tool": diff.name,
                "expected": diff.expected,
                "actual": diff.actual,
            })
        );
    }
    if !diffs.is_empty() {
        bail!(
            "{} of {} calls diverged from transcript {}",
            diffs.len(),
            transcript.calls.len(),
            transcript.id
        );
    }
    info!(session = %transcript.id, calls = transcript.calls.len(), "replay matched");
    Ok(())
}

/// The configured suite's router with the allow-list applied.
fn suite_router(suite: Suite, config: &AppConfig) -> Result<(FrozenClock, ToolRouter)> {
    let clock = config.clock(suite)?;
    let mut router = create_router(suite, clock.clone());
    router.retain_enabled(&config.tools.enabled);
    info!(suite = %suite, tools = router.len(), clock = clock.timestamp(), "router ready");
    Ok((clock, router))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let suite = cli.suite.unwrap_or(config.session.suite);
    let seed: Option<PathBuf> = cli.db.clone().or_else(|| config.session.seed.clone());

    match cli.command {
        Command::Tools => {
            let (_, router) = suite_router(suite, &config)?;
            println!("{}", serde_json::to_string_pretty(&router.definitions())?);
        }
        Command::Call {
            tool,
            arguments,
            out,
        } => {
            let (_, router) = suite_router(suite, &config)?;
            let mut db = load_database(seed.as_deref())?;
            let result = router
                .execute(&mut db, &tool, &arguments)
                .with_context(|| format!("Cannot call {tool}"))?;
            println!("{result}");
            if let Some(out) = out {
                write_database(&db, &out)?;
            }
        }
        Command::Session { name, out, export } => {
            let (clock, router) = suite_router(suite, &config)?;
            let mut db = load_database(seed.as_deref())?;
            let mut transcript = SessionData::new(&name, suite, seed, clock.timestamp());
            run_session(&router, &mut db, &mut transcript).await?;
            if config.session.transcript {
                let path = session::save_session(&transcript)?;
                info!(session = %transcript.id, path = %path.display(), "transcript saved");
            }
            if let Some(export) = export {
                session::export_session(&transcript, &export)?;
            }
            if let Some(out) = out {
                write_database(&db, &out)?;
            }
        }
        Command::Replay { session: target } => {
            replay_transcript(&target, cli.db.as_deref())?;
        }
    }

    Ok(())
}
