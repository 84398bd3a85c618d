//! samqtt - command line entry point
//!
//! One-shot publishing of status and value messages, plus a `run` mode that
//! keeps device paths reported as RUNNING until interrupted.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use samqtt::observability::init_default_logging;
use samqtt::protocol::format_status_datetime;
use samqtt::{ClientConfig, Dialect, PublishOutcome, SensorClient};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_FILE: &str = "samqtt.toml";

/// Publish sensor values and status heartbeats over MQTT
#[derive(Parser)]
#[command(name = "samqtt")]
#[command(about = "Publish sensor values and status heartbeats over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker host, overrides the configuration file
    #[arg(long, env = "SAMQTT_HOST")]
    host: Option<String>,

    /// Broker port, overrides the configuration file
    #[arg(long, env = "SAMQTT_PORT")]
    port: Option<u16>,

    /// MQTT client id, overrides the configuration file
    #[arg(long, env = "SAMQTT_CLIENT_ID")]
    client_id: Option<String>,

    /// Wire dialect (esp or sdw)
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Raise MQTT library log output to debug
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one status message for a device path
    Status {
        path: String,
        #[arg(value_enum)]
        state: StatusArg,
        /// Free text, only sent when non-empty
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Publish one sensor value
    Value {
        entity: String,
        field: String,
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// Envelope timestamp, defaults to now
        #[arg(long)]
        datetime: Option<String>,
    },
    /// Report configured paths as RUNNING until Ctrl-C
    Run,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Running,
    NotRunning,
    Error,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_configuration(&cli);
    let transport_debug = cli.debug || config.as_ref().is_ok_and(|c| c.client.debug);
    init_default_logging(transport_debug);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let client = match SensorClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create client: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Status {
            path,
            state,
            description,
        } => publish_status(&client, &path, state, &description).await,
        Commands::Value {
            entity,
            field,
            amount,
            datetime,
        } => publish_value(&client, &entity, &field, amount, datetime).await,
        Commands::Run => run(client.clone(), &config).await,
    };

    client.cleanup().await;

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(cli: &Cli) -> CliResult<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            ClientConfig::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => ClientConfig::new("localhost", 1883, format!("samqtt-{}", process::id())),
    };

    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(client_id) = &cli.client_id {
        config.broker.client_id = client_id.clone();
    }
    if let Some(dialect) = cli.dialect {
        config.client.dialect = dialect;
    }

    config.validate()?;
    Ok(config)
}

fn require_delivery(outcome: PublishOutcome) -> CliResult<()> {
    match outcome {
        PublishOutcome::Delivered => Ok(()),
        PublishOutcome::Dropped => Err("message dropped, broker not reachable".into()),
    }
}

async fn publish_status(
    client: &SensorClient,
    path: &str,
    state: StatusArg,
    description: &str,
) -> CliResult<()> {
    let outcome = match state {
        StatusArg::Running => client.publish_running(path).await?,
        StatusArg::NotRunning => client.publish_not_running(path).await?,
        StatusArg::Error => client.publish_error(path, description).await?,
    };
    require_delivery(outcome)?;
    info!(path = %path, "Status published");
    Ok(())
}

async fn publish_value(
    client: &SensorClient,
    entity: &str,
    field: &str,
    amount: f64,
    datetime: Option<String>,
) -> CliResult<()> {
    let datetime = datetime.unwrap_or_else(|| format_status_datetime(Utc::now()));
    let mut message = client.new_sensor_value_message(entity, datetime);
    message.add_value(field, amount);

    require_delivery(client.publish_value_message(&message).await?)?;
    info!(topic = %message.publish_topic(), "Value published");
    Ok(())
}

async fn run(client: Arc<SensorClient>, config: &ClientConfig) -> CliResult<()> {
    client.register_connection_callbacks(
        || info!("Broker connection established"),
        || warn!("Broker connection lost, reconnecting in background"),
    );

    client.connect().await?;
    client.publish_all_running().await?;

    let heartbeat = config
        .status
        .heartbeat_interval()
        .map(|interval| client.clone().spawn_status_heartbeat(interval));

    info!(
        paths = client.entity_paths().len(),
        "Reporting status, press Ctrl-C to stop"
    );
    signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");

    if let Some(handle) = heartbeat {
        handle.abort();
    }
    if let Err(e) = client.publish_all_not_running().await {
        warn!(error = %e, "Failed to publish NOT_RUNNING on shutdown");
    }
    Ok(())
}
