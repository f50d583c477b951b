use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod store;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "padlink")]
#[command(about = "Pair with a desktop and drive it from this device")]
#[command(version)]
struct Cli {
    /// Control server URL (overrides PADLINK_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show identity, reachability and pairing status
    Status,
    /// Check pairing and print the payload to scan on the desktop
    Pair,
    /// Verify a token issued by the desktop and store it
    Verify {
        token: String,
    },
    /// Keep the link alive with heartbeats until Ctrl+C
    Run,
    /// Type text on the desktop
    Send {
        text: String,
    },
    /// Press a key combination, e.g. ctrl+c
    Shortcut {
        combo: String,
    },
    /// Run a mouse action, e.g. left_click
    Mouse {
        action: String,
    },
    /// Turn token authentication on or off on the desktop
    Token {
        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Token lifetime in hours
        #[arg(long, requires = "enable")]
        hours: Option<u32>,
    },
    /// Unpair this device and forget its token
    Unpair,
    /// List devices connected to the desktop
    Devices,
    /// Show the desktop's network configuration and phone URL
    Info,
    /// Set which networks may reach the desktop
    AccessMode {
        /// private, campus, lan or all
        mode: String,
    },
    /// List, add or remove allowed browser origins
    Origins {
        #[arg(long, conflicts_with = "remove")]
        add: Option<String>,
        #[arg(long)]
        remove: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "padlink=info,padlink_device_link=info,padlink_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env()?;
    if let Some(server) = cli.server.as_deref() {
        config = config.with_server_url(server);
    }
    tracing::debug!(?config, "Loaded configuration");

    let link = commands::Link::open(&config)?;

    match cli.command {
        Command::Status => commands::status(&link).await,
        Command::Pair => commands::pair(&link).await,
        Command::Verify { token } => commands::verify(&link, &token).await,
        Command::Run => commands::run(&link).await,
        Command::Send { text } => commands::send_text(&link, &text).await,
        Command::Shortcut { combo } => commands::shortcut(&link, &combo).await,
        Command::Mouse { action } => commands::mouse(&link, &action).await,
        Command::Token { enable, hours, .. } => commands::token(&link, enable, hours).await,
        Command::Unpair => commands::unpair(&link).await,
        Command::Devices => commands::devices(&link).await,
        Command::Info => commands::info(&link).await,
        Command::AccessMode { mode } => commands::access_mode(&link, &mode).await,
        Command::Origins { add, remove } => {
            commands::origins(&link, add.as_deref(), remove.as_deref()).await
        }
    }
}
