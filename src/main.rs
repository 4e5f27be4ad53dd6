//! CrossContext CLI entry point.
//!
//! Provides `query`, `audit`, and `serve` subcommands for running one query
//! through the pipeline, reading the audit trail, or serving newline-delimited
//! JSON requests on stdin.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crosscontext::config::{config_dir, load_config, load_or_default, Config};
use crosscontext::service::CrossContext;
use crosscontext::sources::QueryParams;
use crosscontext::types::ResourceKind;

/// CrossContext: classification, redaction, clearance and audit for records.
#[derive(Parser)]
#[command(name = "crosscontext", version, about)]
struct Cli {
    /// Config file. Defaults to `~/.crosscontext/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run one query through the pipeline and print the JSON result.
    Query {
        /// Kind of record: emails, events, documents, policies, stakeholders.
        kind: String,
        /// Free-text query.
        #[arg(default_value = "")]
        query: String,
        /// Caller clearance: officer, senior_officer, director, admin.
        #[arg(long, default_value = "officer")]
        clearance: String,
        /// Kind-specific type filter.
        #[arg(long = "type")]
        type_filter: Option<String>,
        /// Result cap.
        #[arg(long)]
        max_results: Option<usize>,
        /// Caller identity recorded in the audit log.
        #[arg(long)]
        actor: Option<String>,
    },
    /// Print the most recent audit entries, newest last.
    Audit {
        /// Number of entries.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Serve newline-delimited JSON requests on stdin until EOF.
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base_dir = match &cli.config {
        Some(path) => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        None => config_dir()?,
    };

    match cli.command {
        Command::Query {
            kind,
            query,
            clearance,
            type_filter,
            max_results,
            actor,
        } => {
            crosscontext::logging::init_cli();
            let config = resolve_config(cli.config.as_deref(), &base_dir)?;
            let service = CrossContext::from_config(&config, &base_dir)?;
            let kind = ResourceKind::parse(&kind)?;
            let params = QueryParams {
                kind,
                query,
                type_filter,
                max_results: max_results.unwrap_or(config.query.default_max_results),
            };
            let actor = actor.unwrap_or_else(|| config.identity.default_actor.clone());
            let result = service
                .query(&actor, params, &clearance)
                .context("query failed")?;
            print_json(&result)
        }
        Command::Audit { limit } => {
            crosscontext::logging::init_cli();
            let config = resolve_config(cli.config.as_deref(), &base_dir)?;
            let service = CrossContext::from_config(&config, &base_dir)?;
            let entries = service
                .recent_audit(limit)
                .context("failed to read audit log")?;
            print_json(&entries)
        }
        Command::Serve => handle_serve(cli.config.as_deref(), &base_dir),
    }
}

/// Load the explicit config file, or the default one if it exists.
fn resolve_config(explicit: Option<&Path>, base_dir: &Path) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => load_or_default(&base_dir.join("config.toml")),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to encode output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("failed to write output")?;
    Ok(())
}

/// Answer one JSON request per stdin line until EOF.
fn handle_serve(explicit: Option<&Path>, base_dir: &Path) -> anyhow::Result<()> {
    let logs_dir = base_dir.join("logs");
    let _logging_guard = crosscontext::logging::init_production(&logs_dir)?;

    let config = resolve_config(explicit, base_dir)?;
    let service = CrossContext::from_config(&config, base_dir)?;
    info!("serving requests on stdin");

    let stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    let mut handled: u64 = 0;
    for line in stdin.lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = service.handle_line(&line);
        if let Err(e) = writeln!(stdout, "{reply}").and_then(|()| stdout.flush()) {
            warn!(error = %e, "failed to write response, stopping");
            break;
        }
        handled = handled.saturating_add(1);
    }

    info!(handled, "stdin closed, shutting down");
    Ok(())
}
