//! minecraft-agent - Main Entry Point
//!
//! Connects to the broker, subscribes to the request topic and logs each
//! dispatched request until interrupted or the connection is lost.

use clap::{Parser, Subcommand};
use minecraft_agent::agent::MinecraftAgent;
use minecraft_agent::config::AgentConfig;
use minecraft_agent::dispatch::LoggingHandler;
use minecraft_agent::error::AgentResult;
use minecraft_agent::observability::init_default_logging;
use minecraft_agent::transport::mqtt::MqttClient;
use minecraft_agent::transport::Transport;
use std::path::PathBuf;
use std::process;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["minecraft-agent.toml", "config/minecraft-agent.toml"];

/// MQTT agent dispatching keyword requests from a Minecraft topic
#[derive(Parser)]
#[command(name = "minecraft-agent")]
#[command(about = "MQTT agent dispatching facebook/twitter keyword requests")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Broker URL, e.g. tcp://localhost:1883
    #[arg(long, value_name = "URL", env = "MQTT_BROKER_URL", global = true)]
    broker: Option<String>,

    /// MQTT client identifier
    #[arg(long, value_name = "ID", global = true)]
    client_id: Option<String>,

    /// Topic filter to subscribe to
    #[arg(long, global = true)]
    topic: Option<String>,

    /// Subscription QoS (0, 1 or 2)
    #[arg(long, global = true)]
    qos: Option<u8>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (default)
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

/// How a run ended
#[derive(Debug, PartialEq)]
enum RunOutcome {
    Completed,
    ConnectionLost,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AgentConfig) {
        if let Some(broker) = &self.broker {
            config.mqtt.broker_url = broker.clone();
        }
        if let Some(client_id) = &self.client_id {
            config.agent.client_id = client_id.clone();
        }
        if let Some(topic) = &self.topic {
            config.mqtt.topic = topic.clone();
        }
        if let Some(qos) = self.qos {
            config.mqtt.qos = qos;
        }
        if self.quiet {
            config.agent.quiet = true;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = load_configuration(&cli);

    // Logging needs the quiet flag, which may come from the config file
    let quiet = match &loaded {
        Ok((config, _)) => config.agent.quiet,
        Err(_) => cli.quiet,
    };
    init_default_logging(quiet);

    let (config, source) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {}", e.diagnostic());
            process::exit(1);
        }
    };

    info!("Starting minecraft-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    match result {
        Ok(RunOutcome::Completed) => info!("Application shutdown complete"),
        Ok(RunOutcome::ConnectionLost) => {
            error!("MQTT connection permanently lost, exiting");
            process::exit(1);
        }
        Err(e) => {
            error!("Command failed: {}", e.diagnostic());
            process::exit(1);
        }
    }
}

/// Load the config file (or defaults), apply command-line overrides and validate
///
/// Returns the configuration and a description of where it came from.
fn load_configuration(cli: &Cli) -> AgentResult<(AgentConfig, String)> {
    let (mut config, source) = match &cli.config {
        Some(path) => (
            AgentConfig::load_from_file(path)?,
            path.display().to_string(),
        ),
        None => {
            let found = DEFAULT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists());

            match found {
                Some(path) => (
                    AgentConfig::load_from_file(&path)?,
                    path.display().to_string(),
                ),
                None => (AgentConfig::default(), "built-in defaults".to_string()),
            }
        }
    };

    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok((config, source))
}

async fn run_agent(config: AgentConfig) -> AgentResult<RunOutcome> {
    let transport = MqttClient::new(&config)?;
    let mut agent = MinecraftAgent::new(config, transport, LoggingHandler::new());

    agent.start().await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Agent is running and waiting for requests...");

    let outcome = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
            RunOutcome::Completed
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
            RunOutcome::Completed
        }
        _ = monitor_connection_health(&agent) => RunOutcome::ConnectionLost,
    };

    if let Err(e) = agent.shutdown().await {
        // Losing the connection already decided the exit status
        if outcome == RunOutcome::Completed {
            return Err(e.into());
        }
        error!("Error during shutdown: {}", e);
    }

    Ok(outcome)
}

fn handle_config_command(config: &AgentConfig, show: bool) -> AgentResult<RunOutcome> {
    if show {
        let mut shown = config.clone();
        if shown.mqtt.password.is_some() {
            shown.mqtt.password = Some("***".to_string());
        }
        let rendered = toml::to_string_pretty(&shown)
            .map_err(|e| minecraft_agent::AgentError::internal_error(e.to_string()))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(RunOutcome::Completed)
}

/// Resolve once the transport reports the connection is permanently lost
async fn monitor_connection_health<T>(agent: &MinecraftAgent<T, LoggingHandler>)
where
    T: Transport + 'static,
{
    loop {
        if agent.is_permanently_disconnected() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
}
