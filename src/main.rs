//! # jdebug
//!
//! Terminal front end for a remote Java debugging backend: create sessions,
//! launch the target, set breakpoints and follow the live event stream.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jdebug_client::DebuggerApi;
use jdebug_core::SessionId;
use jdebug_settings::{JdebugSettings, TransportKind};
use jdebug_stream::{ConnectionState, DebugStream, EndpointConfig, StreamStatus};
use jdebug_telemetry::{init_telemetry, TelemetryConfig};
use tokio::sync::broadcast::error::RecvError;

/// Remote Java debugger client.
#[derive(Parser, Debug)]
#[command(name = "jdebug", about = "Remote Java debugger client", version)]
struct Cli {
    /// Backend base URL (overrides settings and JDEBUG_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Live event transport.
    #[arg(long, global = true, value_parser = parse_transport)]
    transport: Option<TransportKind>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Settings file (default `~/.jdebug/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a debug session and print its id.
    Session,
    /// Launch the target program.
    Launch {
        /// Fully qualified main class.
        main_class: String,
    },
    /// Register a breakpoint.
    Breakpoint {
        /// Fully qualified class name.
        class_name: String,
        /// Source line (1-based).
        line: u32,
    },
    /// Follow the live event stream until Ctrl-C.
    Watch {
        /// Reuse an existing session instead of creating one.
        #[arg(long)]
        session: Option<String>,
        /// Main class to launch once the stream is open.
        #[arg(long)]
        launch: Option<String>,
        /// Breakpoint as `CLASS:LINE`. May be repeated.
        #[arg(long = "breakpoint", value_parser = parse_breakpoint)]
        breakpoints: Vec<BreakpointArg>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct BreakpointArg {
    class_name: String,
    line: u32,
}

fn parse_transport(val: &str) -> Result<TransportKind, String> {
    TransportKind::parse(val).ok_or_else(|| format!("unknown transport {val:?} (expected sse or stomp)"))
}

fn parse_breakpoint(val: &str) -> Result<BreakpointArg, String> {
    let (class_name, line) = val
        .rsplit_once(':')
        .ok_or_else(|| format!("expected CLASS:LINE, got {val:?}"))?;
    let line: u32 = line.parse().map_err(|_| format!("invalid line number {line:?}"))?;
    if class_name.is_empty() || line == 0 {
        return Err(format!("expected CLASS:LINE with a positive line, got {val:?}"));
    }
    Ok(BreakpointArg {
        class_name: class_name.to_string(),
        line,
    })
}

fn load_settings(cli: &Cli) -> Result<JdebugSettings> {
    let mut settings = match &cli.settings {
        Some(path) => jdebug_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => jdebug_settings::load_settings().context("failed to load settings")?,
    };
    apply_cli_overrides(&mut settings, cli);
    Ok(settings)
}

fn apply_cli_overrides(settings: &mut JdebugSettings, cli: &Cli) {
    if let Some(url) = &cli.api_url {
        settings.api.base_url.clone_from(url);
    }
    if let Some(kind) = cli.transport {
        settings.stream.transport = kind;
    }
    if cli.log_json {
        settings.logging.json = true;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("settings: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let _ = init_telemetry(&TelemetryConfig::from_settings(&settings.logging));
    tracing::debug!(
        api_url = %settings.api.base_url,
        transport = settings.stream.transport.as_str(),
        "settings loaded"
    );

    match run(cli.command, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: &JdebugSettings) -> Result<()> {
    let api = DebuggerApi::from_settings(&settings.api).context("http client")?;
    match command {
        Command::Session => {
            let id = api.create_session().await.context("create session")?;
            println!("{id}");
        }
        Command::Launch { main_class } => {
            let msg = api.launch_target(&main_class).await.context("launch")?;
            println!("{msg}");
        }
        Command::Breakpoint { class_name, line } => {
            let msg = api.add_breakpoint(&class_name, line).await.context("breakpoint")?;
            println!("{msg}");
        }
        Command::Watch {
            session,
            launch,
            breakpoints,
        } => watch(&api, settings, session, launch, breakpoints).await?,
    }
    Ok(())
}

async fn watch(
    api: &DebuggerApi,
    settings: &JdebugSettings,
    session: Option<String>,
    launch: Option<String>,
    breakpoints: Vec<BreakpointArg>,
) -> Result<()> {
    let session_id = match session {
        Some(s) if !s.trim().is_empty() => SessionId::from_raw(s.trim()),
        Some(_) => bail!("session: id must not be empty"),
        None => api.create_session().await.context("create session")?,
    };

    let stream = DebugStream::new(EndpointConfig::from_settings(&settings.api, &settings.stream));
    let _ = stream.subscribe(|event| {
        println!("{} {event}", chrono::Local::now().format("%H:%M:%S%.3f"));
        Ok(())
    });
    let mut changes = stream.state_changes();
    let handle = stream.create_stream(session_id).await;
    eprintln!(
        "session {} via {}{}",
        handle.session_id(),
        settings.stream.transport.as_str(),
        handle.topic().map(|t| format!(" ({t})")).unwrap_or_default()
    );

    for bp in &breakpoints {
        match api.add_breakpoint(&bp.class_name, bp.line).await {
            Ok(msg) => eprintln!("breakpoint: {msg}"),
            Err(e) => eprintln!("breakpoint {}:{}: {e}", bp.class_name, bp.line),
        }
    }
    if let Some(main_class) = &launch {
        match api.launch_target(main_class).await {
            Ok(msg) => eprintln!("launch: {msg}"),
            Err(e) => eprintln!("launch: {e}"),
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            change = changes.recv() => match change {
                Ok(state) => eprintln!("{}", describe(state, &stream.status())),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    stream.shutdown().await;
    Ok(())
}

fn describe(state: ConnectionState, status: &StreamStatus) -> String {
    match (state, &status.last_error) {
        (ConnectionState::Reconnecting, Some(err)) => format!("stream: reconnecting ({err})"),
        (ConnectionState::Connecting, _) if status.attempt > 1 => {
            format!("stream: connecting (attempt {})", status.attempt)
        }
        (state, _) => format!("stream: {state}"),
    }
}
