#![forbid(unsafe_code)]

mod config;
mod constants;
mod dom;
mod interceptor;
mod selector;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::SiteRegistry;
use dom::{Document, KeyEvent, Propagation, SyntheticEvent};
use interceptor::{ListenerState, Verdict};
use session::PageSession;

/// Enter-to-newline interception harness: builds a page session for a
/// hostname and runs keydown events from stdin through the interceptor,
/// reporting every observable effect as JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Hostname of the page the session represents (as location.hostname
    /// would report it)
    hostname: String,

    /// Site registry file (default: the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Page snapshot JSON (default: empty document)
    #[arg(long)]
    page: Option<PathBuf>,

    /// trace, debug, info, warn or error (default: LOG_LEVEL env, then info)
    #[arg(long)]
    log_level: Option<String>,
}

/// One stdin line: a keydown to deliver, or a registry reload
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command {
    Keydown {
        #[serde(flatten)]
        event: KeyEvent,
    },
    Reload,
}

/// One stdout line answering a command
#[derive(Debug, Serialize)]
struct Response {
    verdict: Verdict,
    default_prevented: bool,
    propagation: Propagation,
    attached: bool,
    dispatched: Vec<SyntheticEvent>,
}

fn parse_log_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// An explicitly passed flag wins over the environment variable
fn resolve_log_level(flag: Option<&str>, env: Option<&str>) -> TraceLevel {
    flag.or(env)
        .map(parse_log_level)
        .unwrap_or(TraceLevel::INFO)
}

fn run_command(
    session: &mut PageSession,
    registry: &mut SiteRegistry,
    registry_path: &std::path::Path,
    command: Command,
) -> Result<Response> {
    match command {
        Command::Keydown { mut event } => {
            let verdict = session.keydown(&mut event);
            Ok(Response {
                verdict,
                default_prevented: event.default_prevented,
                propagation: event.propagation,
                attached: session.listener_state() == ListenerState::Attached,
                dispatched: session.take_dispatched(),
            })
        }
        Command::Reload => {
            *registry = SiteRegistry::load(registry_path)?;
            let state = session.reload(registry);
            info!(state = ?state, "Reloaded site registry");
            Ok(Response {
                verdict: Verdict::PassThrough,
                default_prevented: false,
                propagation: Propagation::Continue,
                attached: state == ListenerState::Attached,
                dispatched: Vec::new(),
            })
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // CLI flag wins; LOG_LEVEL env is the fallback for service use
    let env_level = std::env::var("LOG_LEVEL").ok();
    let level = resolve_log_level(args.log_level.as_deref(), env_level.as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let registry_path = args.config.clone().unwrap_or_else(SiteRegistry::path);
    let mut registry = SiteRegistry::load(&registry_path)?;

    let doc = match &args.page {
        Some(path) => Document::load(path)?,
        None => Document::default(),
    };

    let mut session = PageSession::new(args.hostname.clone(), doc, &registry);
    info!(
        hostname = %args.hostname,
        attached = session.listener_state() == ListenerState::Attached,
        "Page session ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Skipping malformed command line");
                continue;
            }
        };

        match run_command(&mut session, &mut registry, &registry_path, command) {
            Ok(response) => {
                let json = serde_json::to_string(&response)
                    .context("Failed to serialize response")?;
                writeln!(stdout, "{json}").context("Failed to write response")?;
            }
            Err(e) => error!(error = %e, "Command failed"),
        }
    }

    Ok(())
}
