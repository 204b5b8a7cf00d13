//! hostdesk CLI and server entry point.
//!
//! Binary name: `hostdesk`
//!
//! Parses CLI arguments, initializes the database and chat components,
//! then either starts the server or runs a maintenance command.

mod http;
mod state;
mod sweeper;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use hostdesk_core::chat::repository::ChatRepository;
use hostdesk_types::chat::SessionStatus;

use state::AppState;

#[derive(Parser)]
#[command(name = "hostdesk", version, about = "Live support chat service for the hosting portal")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the chat server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = 8787, env = "HOSTDESK_PORT")]
        port: u16,

        /// Export spans via OpenTelemetry (stdout exporter)
        #[arg(long)]
        otel: bool,
    },

    /// Show queue and storage status
    Status,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default log filter based on verbosity; RUST_LOG wins when set.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn,hostdesk=info",
        1 => "info,hostdesk=debug",
        _ => "trace",
    };

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "hostdesk", &mut std::io::stdout());
        return Ok(());
    }

    let enable_otel = matches!(&cli.command, Commands::Serve { otel: true, .. });
    hostdesk_observe::tracing_setup::init_tracing(enable_otel, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Initialize application state (DB, chat components)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { host, port, .. } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} hostdesk chat service listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {} WebSocket endpoint: {}",
                console::style("↔").bold(),
                console::style(format!("ws://{addr}/ws/chat?token=<portal-token>")).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let shutdown = CancellationToken::new();
            let sweeper_handle = sweeper::spawn_sweeper(state.clone(), shutdown.clone());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            shutdown.cancel();
            let _ = sweeper_handle.await;
            hostdesk_observe::tracing_setup::shutdown_tracing();

            println!("\n  Server stopped.");
        }

        Commands::Status => {
            let waiting = state
                .repo
                .list_sessions_by_status(SessionStatus::Waiting, None)
                .await
                .map_err(|e| anyhow::anyhow!("status query failed: {e}"))?;
            let active = state
                .repo
                .list_sessions_by_status(SessionStatus::Active, None)
                .await
                .map_err(|e| anyhow::anyhow!("status query failed: {e}"))?;

            println!();
            println!(
                "  {} hostdesk status",
                console::style("🛟").bold()
            );
            println!();
            println!(
                "  Waiting sessions: {}",
                console::style(waiting.len()).yellow()
            );
            println!(
                "  Active sessions:  {}",
                console::style(active.len()).green()
            );
            println!(
                "  Data directory:   {}",
                console::style(state.data_dir.display()).dim()
            );
            println!();
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
