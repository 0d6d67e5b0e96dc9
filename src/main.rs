//! trig-light-console: terminal client for the trigonometric lighting controller
//!
//! Keeps one WebSocket session with the controller service and provides:
//! - A live view of the red, green and blue channel brightness
//! - A start control for voice capture, with the last recognized command
//!
//! Light levels and speech recognition are computed by the service; this
//! client only mirrors them and sends the start request.

mod config;
mod console;
mod error;
mod events;
mod lifecycle;
mod session;
mod transport;

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::console::{ChannelStatusView, CommandPanel, ConsoleAction, InputListener};
use crate::events::SessionNotice;
use crate::lifecycle::ShutdownSignal;
use crate::session::SessionController;

/// How often a stuck recording is checked against the configured timeout
const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with the console views
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "trig-light-console starting"
    );

    let config = Config::load()?;
    info!(
        endpoint = %config.endpoint,
        recording_timeout = ?config.recording_timeout,
        legacy_channels = config.legacy_channels,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // Console input -> main loop
    let (action_tx, mut action_rx) = mpsc::channel::<ConsoleAction>(16);
    // Session controller -> console views
    let (notice_tx, mut notice_rx) = broadcast::channel::<SessionNotice>(64);

    let mut controller = SessionController::new(config, notice_tx);

    let input_listener = InputListener::new(action_tx);
    if let Err(e) = input_listener.start() {
        error!(?e, "failed to start input listener");
    }

    if let Err(e) = controller.initialize().await {
        warn!(error = %e, "continuing without a connection");
    }
    // Initialization may already have queued notices; the full draw covers them
    while notice_rx.try_recv().is_ok() {}
    draw_all(&controller);

    let mut timeout_tick = tokio::time::interval(TIMEOUT_CHECK_INTERVAL);
    let shutdown_wait = shutdown.wait();
    tokio::pin!(shutdown_wait);

    info!("session ready, entering main loop");

    loop {
        tokio::select! {
            event = controller.next_event() => {
                controller.apply(event);
            }

            Some(action) = action_rx.recv() => {
                match action {
                    ConsoleAction::StartRecording => {
                        let panel = CommandPanel::from_session(controller.recording());
                        if !panel.button_enabled {
                            debug!("start control disabled while recording");
                            continue;
                        }
                        if let Err(e) = controller.start_recording() {
                            debug!(error = %e, "start recording refused");
                        }
                    }
                    ConsoleAction::Redraw => draw_all(&controller),
                    ConsoleAction::Quit => {
                        info!("quit requested");
                        break;
                    }
                }
            }

            notice = notice_rx.recv() => {
                match notice {
                    Ok(first) => {
                        let mut notices = vec![first];
                        while let Ok(next) = notice_rx.try_recv() {
                            notices.push(next);
                        }
                        draw_changes(&controller, &notices);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notice receiver lagged");
                        draw_all(&controller);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            _ = timeout_tick.tick() => {
                controller.check_recording_timeout(Instant::now());
            }

            _ = &mut shutdown_wait => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("shutting down...");

    input_listener.stop();
    controller.teardown().await;

    info!("trig-light-console stopped");

    Ok(())
}

fn draw_all(controller: &SessionController) {
    println!("· connection: {}", controller.connection_state());
    print_lines(ChannelStatusView::new(&controller.light_status()).render());
    print_lines(CommandPanel::from_session(controller.recording()).render());
}

/// Redraw only the views touched by `notices`
fn draw_changes(controller: &SessionController, notices: &[SessionNotice]) {
    let mut status_dirty = false;
    let mut panel_dirty = false;

    for notice in notices {
        match notice {
            SessionNotice::StatusChanged(_) => status_dirty = true,
            SessionNotice::PhaseChanged { .. } | SessionNotice::CommandReceived { .. } => {
                panel_dirty = true;
            }
            SessionNotice::RecordingUnavailable { reason } => {
                println!("! Cannot start recording: {reason}");
            }
            SessionNotice::RecordingTimedOut { after } => {
                println!(
                    "! No command received after {}s, recording cancelled",
                    after.as_secs()
                );
                panel_dirty = true;
            }
            SessionNotice::ConnectionUnavailable { endpoint } => {
                println!("! Controller service unavailable at {endpoint}");
            }
            SessionNotice::ConnectionLost => {
                println!("! Connection to controller service lost");
            }
        }
    }

    if status_dirty {
        print_lines(ChannelStatusView::new(&controller.light_status()).render());
    }
    if panel_dirty {
        print_lines(CommandPanel::from_session(controller.recording()).render());
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
