use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use drawroom_client::ClientOptions;
use drawroom_core::config::Config;
use drawroom_gateway::GatewayState;

mod join;
mod logging;

#[derive(Parser)]
#[command(
    name = "drawroom",
    about = "Shared whiteboard and chat rooms over WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,

        /// Don't serve the browser whiteboard
        #[arg(long)]
        no_ui: bool,
    },

    /// Join a room from the terminal
    Join {
        /// Room to join
        #[arg(short, long)]
        room: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Server WebSocket URL (default from config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for mistakes
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose)?;
    tracing::debug!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Serve { port, bind, no_ui } => {
            let mut gateway = config.gateway();
            if let Some(port) = port {
                gateway.port = port;
            }
            if bind.is_some() {
                gateway.bind = bind;
            }
            if no_ui {
                gateway.ui = false;
            }
            config.gateway = Some(gateway);

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }

            let state = GatewayState::new(Arc::new(config));
            #[cfg(feature = "metrics")]
            let state = state.with_prometheus(drawroom_gateway::metrics::install_prometheus_recorder()?);

            tracing::info!("Starting Drawroom v{}", env!("CARGO_PKG_VERSION"));
            drawroom_gateway::start_gateway(Arc::new(state)).await?;
        }
        Commands::Join { room, name, url } => {
            let mut options = ClientOptions::from_config(&config.client(), room, name);
            if let Some(url) = url {
                options.url = url;
            }
            join::run(options).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
            ConfigAction::Path => println!("{}", config_path.display()),
        },
    }

    Ok(())
}
