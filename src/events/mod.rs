//! Events flowing into and out of the session controller
//!
//! `InboundEvent` is what the transport delivers, in server order.
//! `SessionNotice` is what the controller broadcasts after it mutates state,
//! so the console knows which view to redraw.

use std::time::Duration;

use crate::session::{LightStatus, Phase};

/// Decoded messages from the controller service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// New brightness for all three channels
    LightStatus(LightStatus),

    /// Speech recognition finished with this text
    VoiceCommand(String),
}

/// Notifications emitted by the controller during transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// LightStatus now holds a different value
    StatusChanged(LightStatus),

    /// Recording phase changed
    PhaseChanged { from: Phase, to: Phase },

    /// A voice command was recorded as the latest one
    CommandReceived { command: String },

    /// `start_recording` was refused because no connection is live
    RecordingUnavailable { reason: String },

    /// A recording exceeded the configured timeout and was reverted
    RecordingTimedOut { after: Duration },

    /// The initial connection could not be established
    ConnectionUnavailable { endpoint: String },

    /// The transport gave up and closed its event channel
    ConnectionLost,
}

impl std::fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundEvent::LightStatus(status) => write!(f, "LED_STATUS ({})", status),
            InboundEvent::VoiceCommand(command) => write!(f, "VOICE_COMMAND ({:?})", command),
        }
    }
}

impl std::fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionNotice::StatusChanged(status) => write!(f, "STATUS_CHANGED ({})", status),
            SessionNotice::PhaseChanged { from, to } => {
                write!(f, "PHASE_CHANGED ({} -> {})", from, to)
            }
            SessionNotice::CommandReceived { command } => {
                write!(f, "COMMAND_RECEIVED ({:?})", command)
            }
            SessionNotice::RecordingUnavailable { reason } => {
                write!(f, "RECORDING_UNAVAILABLE ({})", reason)
            }
            SessionNotice::RecordingTimedOut { after } => {
                write!(f, "RECORDING_TIMED_OUT ({}ms)", after.as_millis())
            }
            SessionNotice::ConnectionUnavailable { endpoint } => {
                write!(f, "CONNECTION_UNAVAILABLE ({})", endpoint)
            }
            SessionNotice::ConnectionLost => write!(f, "CONNECTION_LOST"),
        }
    }
}
