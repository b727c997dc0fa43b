//! screwd - Screw-insertion robot control daemon
//!
//! Wires the kernel tasks together: network manager, command dispatcher,
//! operation scheduler and status broadcaster, all sharing one control core
//! and one actuator.

use anyhow::{Context, Result};
use clap::Parser;
use screwd::{
    Actuator, CommandDispatcher, ConnectionManager, ControlCore, DaemonConfig, Mailbox,
    OperationScheduler, Outbox, SimActuator, StatusBroadcaster, StopFlag,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "screwd")]
#[command(about = "Screw-insertion robot controller - TCP command kernel")]
#[command(version)]
struct Args {
    /// Path to the daemon configuration file
    #[arg(short, long)]
    config: Option<String>,
}

impl Args {
    fn get_config_path(&self) -> Option<String> {
        self.config
            .clone()
            .or_else(|| std::env::var("SCREWD_CONFIG").ok())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = match args.get_config_path() {
        Some(path) => {
            info!("Using config: {}", path);
            DaemonConfig::load_from_path(&path).context("Failed to load configuration")?
        }
        None => {
            info!("No config given, using built-in defaults");
            DaemonConfig::default()
        }
    };

    info!("Screw-insertion control kernel");
    info!("Listening on {}", config.listen_addr());
    info!(
        "Queue capacity {}, status every {}ms",
        config.queue_capacity(),
        config.status_interval_ms()
    );

    // The simulator stands in for the vendor motion driver; swap the Arc
    // to target real hardware.
    let actuator = Arc::new(SimActuator::new());
    actuator
        .set_speed_factor(config.default_speed())
        .await
        .context("Failed to apply startup speed factor")?;

    let core = ControlCore::shared(config.queue_capacity(), config.default_speed());
    let stop = StopFlag::new();
    let wake = Arc::new(Notify::new());

    let mailbox_timeout = Duration::from_secs(config.mailbox_timeout_secs());
    let (inbound, inbound_rx) = Mailbox::channel(mailbox_timeout, "inbound");
    let (outbox, outbound) = Outbox::channel(mailbox_timeout);

    let dispatcher = CommandDispatcher::new(
        core.clone(),
        actuator.clone(),
        outbox.clone(),
        stop.clone(),
        wake.clone(),
    );
    let scheduler = OperationScheduler::new(
        core.clone(),
        actuator.clone(),
        outbox.clone(),
        stop.clone(),
        wake,
        config.motion.clone(),
    );
    let broadcaster = StatusBroadcaster::new(
        core.clone(),
        actuator.clone(),
        outbox,
        Duration::from_millis(config.status_interval_ms()),
    );
    let manager = ConnectionManager::new(
        config.listen_addr(),
        Duration::from_secs(config.accept_timeout_secs()),
        inbound,
        outbound,
        core,
        stop,
    );

    tokio::spawn(async move { dispatcher.run(inbound_rx).await });
    tokio::spawn(async move { scheduler.run().await });
    tokio::spawn(async move { broadcaster.run().await });

    // The network loop reconnects forever; an error here means the bind
    // itself failed and the daemon cannot do anything useful.
    tokio::select! {
        result = manager.run() => {
            if let Err(e) = &result {
                error!("Network manager failed: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            Ok(())
        }
    }
}
