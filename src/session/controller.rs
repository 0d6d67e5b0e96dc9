//! Client session controller
//!
//! Owns the light status, the recording session and the one connection to
//! the controller service. It is the only writer of that state; views read it
//! through accessors and learn about changes from broadcast notices.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SessionError;
use crate::events::{InboundEvent, SessionNotice};
use crate::transport::{Connection, ConnectionState, Decoder, OutboundFrame};

use super::model::{LightStatus, Phase, RecordingSession};

pub struct SessionController {
    config: Config,
    light_status: LightStatus,
    recording: RecordingSession,
    connection: Option<Connection>,
    /// Set by `teardown()`; inbound events are dropped from then on
    torn_down: bool,
    notice_tx: broadcast::Sender<SessionNotice>,
}

impl SessionController {
    pub fn new(config: Config, notice_tx: broadcast::Sender<SessionNotice>) -> Self {
        Self {
            config,
            light_status: LightStatus::default(),
            recording: RecordingSession::default(),
            connection: None,
            torn_down: false,
            notice_tx,
        }
    }

    /// Get the latest light status
    pub fn light_status(&self) -> LightStatus {
        self.light_status
    }

    /// Get the recording session
    pub fn recording(&self) -> &RecordingSession {
        &self.recording
    }

    /// Get the state of the connection, `Disconnected` when there is none
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(Connection::connection_state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    #[cfg(test)]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Open the connection to the configured endpoint.
    ///
    /// Calling this after `teardown()` starts a fresh session. On failure the
    /// controller stays usable; `start_recording()` just reports that no
    /// connection is available.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if self.connection.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.reset_if_torn_down();

        let decoder = Decoder::new(self.config.legacy_channels);
        match Connection::open(
            &self.config.endpoint,
            decoder,
            self.config.max_reconnect_attempts,
        )
        .await
        {
            Ok(connection) => {
                self.attach(connection);
                info!(endpoint = %self.config.endpoint, "session initialized");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "controller service unavailable");
                self.emit(SessionNotice::ConnectionUnavailable {
                    endpoint: self.config.endpoint.clone(),
                });
                Err(err.into())
            }
        }
    }

    /// Install `connection` as the session's only connection.
    pub(crate) fn attach(&mut self, connection: Connection) {
        self.reset_if_torn_down();
        self.connection = Some(connection);
    }

    /// Start a fresh session after `teardown()`.
    fn reset_if_torn_down(&mut self) {
        if !self.torn_down {
            return;
        }
        debug!("starting fresh session");
        self.light_status = LightStatus::default();
        self.recording = RecordingSession::default();
        self.torn_down = false;
    }

    /// Wait for the next inbound event.
    ///
    /// Pends forever while there is no connection. If the transport gives
    /// up, the connection is dropped and `ConnectionLost` is broadcast.
    pub async fn next_event(&mut self) -> InboundEvent {
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return std::future::pending().await;
            };

            match connection.recv().await {
                Some(event) => return event,
                None => {
                    self.connection = None;
                    if !self.torn_down {
                        warn!("connection to controller service lost");
                        self.emit(SessionNotice::ConnectionLost);
                    }
                }
            }
        }
    }

    /// Apply one inbound event.
    pub fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::LightStatus(status) => self.on_light_status(status),
            InboundEvent::VoiceCommand(command) => self.on_voice_command(command),
        }
    }

    /// Replace the light status wholesale.
    pub fn on_light_status(&mut self, status: LightStatus) {
        if self.torn_down {
            debug!(%status, "session torn down, dropping status");
            return;
        }
        if status == self.light_status {
            return;
        }

        debug!(from = %self.light_status, to = %status, "light status updated");
        self.light_status = status;
        self.emit(SessionNotice::StatusChanged(status));
    }

    /// Record a recognized command. Always ends up `Idle`.
    pub fn on_voice_command(&mut self, command: String) {
        if self.torn_down {
            debug!(%command, "session torn down, dropping command");
            return;
        }

        info!(%command, phase = %self.recording.phase, "voice command received");
        self.recording.last_command = Some(command.clone());
        self.emit(SessionNotice::CommandReceived { command });
        self.set_phase(Phase::Idle);
    }

    /// Ask the service to start capturing voice input.
    ///
    /// The phase flips to `Recording` as soon as the frame is queued; there
    /// is no acknowledgment. A second call while recording sends nothing.
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.torn_down {
            return Err(SessionError::TornDown);
        }
        if self.recording.is_recording() {
            debug!("already recording, ignoring start request");
            return Ok(());
        }

        let connection = match self.connection.as_ref() {
            Some(connection) if connection.is_connected() => connection,
            other => {
                let reason = match other {
                    Some(connection) => format!("connection is {:?}", connection.connection_state()),
                    None => "no connection".to_string(),
                };
                warn!(%reason, "cannot start recording");
                self.emit(SessionNotice::RecordingUnavailable { reason });
                return Err(SessionError::NotConnected);
            }
        };

        if let Err(err) = connection.send(OutboundFrame::StartRecording) {
            warn!(error = %err, "cannot start recording");
            self.emit(SessionNotice::RecordingUnavailable {
                reason: err.to_string(),
            });
            return Err(err.into());
        }

        self.recording.started_at = Some(Instant::now());
        self.set_phase(Phase::Recording);
        Ok(())
    }

    /// Revert a recording that has outlived the configured timeout.
    ///
    /// Returns `true` if the phase was reverted.
    pub fn check_recording_timeout(&mut self, now: Instant) -> bool {
        let Some(timeout) = self.config.recording_timeout else {
            return false;
        };
        if self.torn_down || !self.recording.is_recording() {
            return false;
        }
        let Some(started_at) = self.recording.started_at else {
            return false;
        };

        let elapsed = now.saturating_duration_since(started_at);
        if elapsed < timeout {
            return false;
        }

        warn!(elapsed_ms = elapsed.as_millis() as u64, "recording timed out");
        self.set_phase(Phase::Idle);
        self.emit(SessionNotice::RecordingTimedOut { after: elapsed });
        true
    }

    /// Close the connection and stop applying events.
    ///
    /// Waits, bounded, for the transport to send its Close frame. Only the
    /// first call has an effect.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            debug!("session already torn down");
            return;
        }
        self.torn_down = true;

        if let Some(connection) = self.connection.take() {
            let dropped = connection.close().await;
            info!(dropped, "connection closed");
        }
        info!("session torn down");
    }

    fn set_phase(&mut self, new_phase: Phase) {
        let old_phase = self.recording.phase;
        if new_phase == Phase::Idle {
            self.recording.started_at = None;
        }
        if old_phase == new_phase {
            return;
        }

        info!(from = %old_phase, to = %new_phase, "phase transition");
        self.recording.phase = new_phase;
        self.emit(SessionNotice::PhaseChanged {
            from: old_phase,
            to: new_phase,
        });
    }

    fn emit(&self, notice: SessionNotice) {
        debug!(%notice, "emitting notice");
        let _ = self.notice_tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::transport::ClientCommand;

    fn create_controller(config: Config) -> (SessionController, broadcast::Receiver<SessionNotice>) {
        let (tx, rx) = broadcast::channel(64);
        (SessionController::new(config, tx), rx)
    }

    fn create_connected(
        config: Config,
    ) -> (
        SessionController,
        broadcast::Receiver<SessionNotice>,
        mpsc::Receiver<ClientCommand>,
        mpsc::Sender<InboundEvent>,
    ) {
        let (mut controller, notices) = create_controller(config);
        let (connection, cmd_rx, event_tx) = Connection::new_for_test(ConnectionState::Connected);
        controller.attach(connection);
        (controller, notices, cmd_rx, event_tx)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionNotice>) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    #[test]
    fn test_initial_state() {
        let (controller, _) = create_controller(Config::default());
        assert_eq!(controller.light_status(), LightStatus::new(0, 0, 0));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert_eq!(controller.recording().last_command(), None);
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_status_replaces_wholesale() {
        let (mut controller, mut notices) = create_controller(Config::default());

        controller.apply(InboundEvent::LightStatus(LightStatus::new(50, 0, 100)));
        assert_eq!(controller.light_status(), LightStatus::new(50, 0, 100));
        assert_eq!(controller.recording().phase(), Phase::Idle);

        controller.apply(InboundEvent::LightStatus(LightStatus::new(0, 25, 0)));
        assert_eq!(controller.light_status(), LightStatus::new(0, 25, 0));

        assert_eq!(
            drain(&mut notices),
            vec![
                SessionNotice::StatusChanged(LightStatus::new(50, 0, 100)),
                SessionNotice::StatusChanged(LightStatus::new(0, 25, 0)),
            ]
        );
    }

    #[test]
    fn test_status_is_idempotent() {
        let (mut controller, mut notices) = create_controller(Config::default());
        let status = LightStatus::new(70, 70, 0);

        controller.on_light_status(status);
        let once = controller.light_status();
        controller.on_light_status(status);

        assert_eq!(controller.light_status(), once);
        assert_eq!(drain(&mut notices).len(), 1);
    }

    #[test]
    fn test_status_leaves_recording_alone() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());
        assert_ok!(controller.start_recording());

        controller.on_light_status(LightStatus::new(10, 10, 10));
        assert_eq!(controller.recording().phase(), Phase::Recording);
    }

    #[test]
    fn test_start_recording_sends_one_frame() {
        let (mut controller, mut notices, mut cmd_rx, _event_tx) =
            create_connected(Config::default());

        assert_ok!(controller.start_recording());
        assert_eq!(controller.recording().phase(), Phase::Recording);
        assert_eq!(
            cmd_rx.try_recv().ok(),
            Some(ClientCommand::Send(OutboundFrame::StartRecording))
        );

        assert_ok!(controller.start_recording());
        assert!(cmd_rx.try_recv().is_err());

        assert_eq!(
            drain(&mut notices),
            vec![SessionNotice::PhaseChanged {
                from: Phase::Idle,
                to: Phase::Recording,
            }]
        );
    }

    #[test]
    fn test_voice_command_ends_recording() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());
        assert_ok!(controller.start_recording());

        controller.apply(InboundEvent::VoiceCommand("turn on red".into()));

        assert_eq!(controller.recording().last_command(), Some("turn on red"));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert_eq!(controller.recording().started_at, None);
    }

    #[test]
    fn test_voice_command_while_idle() {
        let (mut controller, mut notices) = create_controller(Config::default());

        controller.on_voice_command("first".into());
        controller.on_voice_command("second".into());

        assert_eq!(controller.recording().last_command(), Some("second"));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert_eq!(
            drain(&mut notices),
            vec![
                SessionNotice::CommandReceived {
                    command: "first".into()
                },
                SessionNotice::CommandReceived {
                    command: "second".into()
                },
            ]
        );
    }

    #[test]
    fn test_start_recording_without_connection() {
        let (mut controller, mut notices) = create_controller(Config::default());

        let err = assert_err!(controller.start_recording());
        assert!(matches!(err, SessionError::NotConnected));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert!(matches!(
            drain(&mut notices).as_slice(),
            [SessionNotice::RecordingUnavailable { .. }]
        ));
    }

    #[test]
    fn test_start_recording_while_reconnecting() {
        let (mut controller, _, mut cmd_rx, _event_tx) = create_connected(Config::default());
        if let Some(connection) = controller.connection.as_ref() {
            connection.set_state_for_test(ConnectionState::Reconnecting { attempt: 2 });
        }

        assert!(matches!(
            controller.start_recording(),
            Err(SessionError::NotConnected)
        ));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_start_recording_with_dead_task() {
        let (mut controller, _, cmd_rx, _event_tx) = create_connected(Config::default());
        drop(cmd_rx);

        assert!(matches!(
            controller.start_recording(),
            Err(SessionError::Transport(crate::error::TransportError::Closed))
        ));
        assert_eq!(controller.recording().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (mut controller, _, _cmd_rx, event_tx) = create_connected(Config::default());

        event_tx
            .send(InboundEvent::LightStatus(LightStatus::new(1, 2, 3)))
            .await
            .unwrap();
        event_tx
            .send(InboundEvent::VoiceCommand("relax".into()))
            .await
            .unwrap();
        event_tx
            .send(InboundEvent::LightStatus(LightStatus::new(4, 5, 6)))
            .await
            .unwrap();

        for _ in 0..3 {
            let event = controller.next_event().await;
            controller.apply(event);
        }

        assert_eq!(controller.light_status(), LightStatus::new(4, 5, 6));
        assert_eq!(controller.recording().last_command(), Some("relax"));
    }

    #[tokio::test]
    async fn test_teardown_drops_queued_events() {
        let (mut controller, _, mut cmd_rx, event_tx) = create_connected(Config::default());

        event_tx
            .send(InboundEvent::LightStatus(LightStatus::new(90, 90, 90)))
            .await
            .unwrap();
        controller.teardown().await;

        assert_eq!(cmd_rx.recv().await, Some(ClientCommand::Disconnect));
        assert!(tokio::time::timeout(Duration::from_millis(20), controller.next_event())
            .await
            .is_err());

        controller.apply(InboundEvent::LightStatus(LightStatus::new(90, 90, 90)));
        controller.apply(InboundEvent::VoiceCommand("too late".into()));
        assert_eq!(controller.light_status(), LightStatus::default());
        assert_eq!(controller.recording().last_command(), None);
    }

    #[tokio::test]
    async fn test_teardown_runs_once() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());

        controller.teardown().await;
        controller.teardown().await;

        assert!(controller.is_torn_down());
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            controller.start_recording(),
            Err(SessionError::TornDown)
        ));
    }

    #[tokio::test]
    async fn test_attach_after_teardown_starts_fresh() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());
        controller.on_light_status(LightStatus::new(5, 5, 5));
        controller.on_voice_command("hello".into());
        controller.teardown().await;

        let (connection, _cmd_rx, _event_tx) = Connection::new_for_test(ConnectionState::Connected);
        controller.attach(connection);

        assert!(!controller.is_torn_down());
        assert_eq!(controller.light_status(), LightStatus::default());
        assert_eq!(controller.recording().last_command(), None);
    }

    #[tokio::test]
    async fn test_connection_lost() {
        let (mut controller, mut notices, _cmd_rx, event_tx) = create_connected(Config::default());
        drop(event_tx);

        assert!(tokio::time::timeout(Duration::from_millis(20), controller.next_event())
            .await
            .is_err());
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
        assert_eq!(drain(&mut notices), vec![SessionNotice::ConnectionLost]);
    }

    async fn unreachable_config() -> Config {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        Config {
            endpoint: format!("ws://{addr}/ws"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_unreachable_endpoint() {
        let (mut controller, mut notices) = create_controller(unreachable_config().await);

        assert!(matches!(
            controller.initialize().await,
            Err(SessionError::Transport(_))
        ));
        assert!(matches!(
            drain(&mut notices).as_slice(),
            [SessionNotice::ConnectionUnavailable { .. }]
        ));

        assert!(controller.start_recording().is_err());
        assert_eq!(controller.recording().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_failed_reinitialize_after_teardown_starts_fresh() {
        let (mut controller, _) = create_controller(unreachable_config().await);
        let (connection, _cmd_rx, _event_tx) = Connection::new_for_test(ConnectionState::Connected);
        controller.attach(connection);
        controller.on_light_status(LightStatus::new(40, 40, 40));
        controller.on_voice_command("lights off".into());
        controller.teardown().await;

        assert_err!(controller.initialize().await);

        assert!(!controller.is_torn_down());
        assert_eq!(controller.light_status(), LightStatus::default());
        assert_eq!(controller.recording().last_command(), None);
        assert!(matches!(
            controller.start_recording(),
            Err(SessionError::NotConnected)
        ));

        controller.on_light_status(LightStatus::new(1, 2, 3));
        assert_eq!(controller.light_status(), LightStatus::new(1, 2, 3));
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());
        assert!(matches!(
            controller.initialize().await,
            Err(SessionError::AlreadyConnected)
        ));
    }

    #[test]
    fn test_recording_timeout() {
        let config = Config {
            recording_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        let (mut controller, mut notices, _cmd_rx, _event_tx) = create_connected(config);
        assert_ok!(controller.start_recording());
        drain(&mut notices);

        let started_at = controller.recording().started_at.unwrap();
        assert!(!controller.check_recording_timeout(started_at + Duration::from_secs(4)));
        assert_eq!(controller.recording().phase(), Phase::Recording);

        assert!(controller.check_recording_timeout(started_at + Duration::from_secs(5)));
        assert_eq!(controller.recording().phase(), Phase::Idle);
        assert_eq!(
            drain(&mut notices),
            vec![
                SessionNotice::PhaseChanged {
                    from: Phase::Recording,
                    to: Phase::Idle,
                },
                SessionNotice::RecordingTimedOut {
                    after: Duration::from_secs(5)
                },
            ]
        );
    }

    #[test]
    fn test_no_timeout_by_default() {
        let (mut controller, _, _cmd_rx, _event_tx) = create_connected(Config::default());
        assert_ok!(controller.start_recording());

        let far_future = Instant::now() + Duration::from_secs(24 * 60 * 60);
        assert!(!controller.check_recording_timeout(far_future));
        assert_eq!(controller.recording().phase(), Phase::Recording);
    }
}
