//! Console input listener
//!
//! Reads stdin line by line on a dedicated thread and forwards the
//! recognized actions to the main loop. A plain thread is used so a pending
//! read never holds up runtime shutdown.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Actions the user can trigger from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Press the start-recording control
    StartRecording,
    /// Print both views again
    Redraw,
    /// End the session
    Quit,
}

/// Map one input line to an action
pub fn parse_action(line: &str) -> Option<ConsoleAction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "r" | "record" => Some(ConsoleAction::StartRecording),
        "s" | "status" => Some(ConsoleAction::Redraw),
        "q" | "quit" | "exit" => Some(ConsoleAction::Quit),
        _ => None,
    }
}

/// Errors that can occur in the input listener
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Stdin listener feeding [`ConsoleAction`]s into a channel
pub struct InputListener {
    action_tx: mpsc::Sender<ConsoleAction>,
    running: Arc<AtomicBool>,
}

impl InputListener {
    pub fn new(action_tx: mpsc::Sender<ConsoleAction>) -> Self {
        Self {
            action_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the stdin reader thread.
    ///
    /// When stdin reaches EOF the thread sends `Quit` and exits.
    pub fn start(&self) -> Result<(), InputError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(InputError::AlreadyRunning);
        }

        let action_tx = self.action_tx.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("input-listener".to_string())
            .spawn(move || {
                info!("input listener thread started");

                if let Err(e) = read_actions(&action_tx, &running) {
                    error!(?e, "input listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("input listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                InputError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop forwarding input after the next line
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Forward actions from stdin until EOF, stop, or the receiver goes away
fn read_actions(
    action_tx: &mpsc::Sender<ConsoleAction>,
    running: &AtomicBool,
) -> std::io::Result<()> {
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let line = line?;
        match parse_action(&line) {
            Some(action) => {
                if action_tx.blocking_send(action).is_err() {
                    warn!("failed to send console action - channel closed?");
                    return Ok(());
                }
            }
            None => debug!(%line, "ignoring unknown input"),
        }
    }

    debug!("stdin closed");
    let _ = action_tx.blocking_send(ConsoleAction::Quit);
    Ok(())
}
