//! # boxlink-send
//!
//! Sends one action to one device and prints the reply.
//!
//! ```bash
//! # Print on box 7 (bare or array-wrapped id)
//! boxlink-send 7 printer_0 '{"receipt": "Total 4.20"}'
//! boxlink-send '[7, "Counter"]' printer_0 '{"receipt": "Total 4.20"}'
//!
//! # Retry with the same action id
//! boxlink-send 7 printer_0 '{"receipt": "..."}' --action-id 8a4f...
//!
//! # Send the session's blackbox backlog to the configured [queue] blackbox
//! boxlink-send --flush-blackbox
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use boxlink_core::{ActionId, BoxRef, DeliveryRequest, MessageType};
use boxlink_db::{Database, DbConfig};
use boxlink_delivery::{
    BlackboxQueue, BoxDirectory, ConnectionCache, DeliveryConfig, DeliveryOrchestrator,
    LongPollingTransport, OrchestratorBatchSender, QueueConfig, StaticDirectory, Transport,
    WebSocketConfig, WebSocketTransport,
};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Send an action to a device on an IoT box
#[derive(Parser, Debug)]
#[command(name = "boxlink-send")]
#[command(about = "Send an action to a device on an IoT box")]
#[command(version)]
struct Args {
    /// Box id, bare (`7`) or array-wrapped (`[7, "name"]`)
    #[arg(required_unless_present = "flush_blackbox")]
    target: Option<String>,

    /// Device identifier on the box
    #[arg(required_unless_present = "flush_blackbox")]
    device_id: Option<String>,

    /// JSON payload
    #[arg(required_unless_present = "flush_blackbox")]
    payload: Option<String>,

    /// Flush the persisted blackbox backlog instead of sending an action
    #[arg(long, conflicts_with_all = ["target", "device_id", "payload"])]
    flush_blackbox: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reuse an action id instead of generating one
    #[arg(long)]
    action_id: Option<String>,

    /// Message type sent to the box
    #[arg(long, default_value = "iot_action")]
    message_type: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DeliveryConfig::load(args.config)?;

    let directory = open_directory(&config).await?;
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        ConnectionCache::new(directory),
        build_transports(&config)?,
        (&config).into(),
    ));

    if args.flush_blackbox {
        return flush_blackbox(&config, orchestrator).await;
    }

    let (Some(target), Some(device_id), Some(payload)) = (args.target, args.device_id, args.payload)
    else {
        return Err("target, device id and payload are required".into());
    };
    let target: BoxRef = serde_json::from_str(&target)?;
    let payload: Value = serde_json::from_str(&payload)?;

    let request = DeliveryRequest::new(target, device_id, payload);
    let outcome = orchestrator
        .deliver(
            &request,
            args.action_id.map(ActionId::from),
            &MessageType::from(args.message_type.as_str()),
        )
        .await;

    match outcome {
        Ok(report) => {
            info!(
                box_id = %report.box_id,
                transport = %report.transport,
                action_id = %report.action_id,
                "Delivered"
            );
            println!("{}", serde_json::to_string_pretty(&report.response)?);
            Ok(())
        }
        Err(e) => {
            let status = orchestrator.status().await;
            error!(error = %e, %status, "Delivery failed");
            if let Some(response) = e.device_response() {
                println!("{}", serde_json::to_string_pretty(response)?);
            }
            Err(e.into())
        }
    }
}

/// Sends the session's persisted backlog to the `[queue]` blackbox.
async fn flush_blackbox(
    config: &DeliveryConfig,
    orchestrator: Arc<DeliveryOrchestrator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sender = OrchestratorBatchSender::from_config(orchestrator, config)?;
    let store = Arc::new(open_database(config).await?);

    let queue = BlackboxQueue::open(
        store,
        config.session_token(),
        Arc::new(sender),
        QueueConfig::from(config),
    )
    .await?;

    let pending = queue.len().await;
    if pending == 0 {
        info!("Blackbox backlog is empty");
        return Ok(());
    }

    match queue.flush().await {
        Ok(results) => {
            info!(count = results.len(), "Blackbox backlog flushed");
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, remaining = queue.len().await, "Blackbox flush failed");
            Err(e.into())
        }
    }
}

/// Uses the `[[boxes]]` table when present, else the box table in SQLite.
async fn open_directory(
    config: &DeliveryConfig,
) -> Result<Arc<dyn BoxDirectory>, Box<dyn std::error::Error>> {
    if !config.boxes.is_empty() {
        return Ok(Arc::new(StaticDirectory::new(config.static_boxes())));
    }

    Ok(Arc::new(open_database(config).await?))
}

async fn open_database(config: &DeliveryConfig) -> Result<Database, Box<dyn std::error::Error>> {
    let path = config
        .database_path()
        .ok_or("no database path available; set [session] database_path")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(Database::new(DbConfig::new(path)).await?)
}

/// Long-polling always; the relay only when a URL is configured.
fn build_transports(
    config: &DeliveryConfig,
) -> Result<Vec<Arc<dyn Transport>>, Box<dyn std::error::Error>> {
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    transports.push(Arc::new(LongPollingTransport::new(config.into())?));

    if let Some(ws_config) = WebSocketConfig::from_config(config) {
        transports.push(Arc::new(WebSocketTransport::new(ws_config)?));
    }

    Ok(transports)
}
