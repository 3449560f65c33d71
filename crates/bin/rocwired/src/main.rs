//! # rocwired — rocwire daemon
//!
//! Composition root that wires a board link, the dispatcher and the
//! platform together and runs the control loop.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Construct the board link (adapter) and move it onto the worker thread
//! - Construct the platform, injecting the event bus via its port trait
//! - Attach to the board and install the configured rules
//! - Feed polled events into the platform and settle stepper moves until SIGINT
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use rocwire_adapter_virtual::VirtualBoard;
use rocwire_app::dispatcher::Dispatcher;
use rocwire_app::event_bus::InProcessEventBus;
use rocwire_app::services::Platform;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// How often settled stepper moves are checked.
const MOTION_TICK: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Board link
    let identity = &config.virtual_board;
    let board = identity.sw16.iter().fold(
        VirtualBoard::new().with_firmware(
            identity.firmware_version,
            identity.firmware_revision,
            identity.board_id,
        ),
        |board, sw16| board.with_sw16(sw16.slot, sw16.device_type, sw16.board_id),
    );
    let (dispatcher, mut events) = Dispatcher::spawn(board, config.poll_interval())?;

    // Event bus
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let mut subscriber = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match subscriber.recv().await {
                Ok(event) => tracing::info!(kind = %event.kind, "event"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Platform
    let mut platform = Platform::new(dispatcher, Arc::clone(&event_bus), config.board_map())?;
    platform.attach().await?;
    for line in platform.info_string().await?.lines() {
        tracing::info!("{line}");
    }
    for rule in config.rules.iter().cloned() {
        let handle = platform.install_rule(rule)?;
        tracing::info!(switch = %handle.switch, driver = %handle.driver, "rule installed");
    }
    platform.sync().await?;
    tracing::info!("rocwired running");

    let mut motion = tokio::time::interval(MOTION_TICK);
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::error!("board worker stopped");
                    break;
                };
                if let Err(err) = platform.process_event(event).await {
                    tracing::error!(error = %err, "failed to process event");
                }
            }
            tick = motion.tick() => {
                if let Err(err) = platform.poll_motion(tick.into_std()) {
                    tracing::error!(error = %err, "failed to settle stepper moves");
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
