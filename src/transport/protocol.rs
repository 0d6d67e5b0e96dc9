//! Wire format for the controller service
//!
//! Every frame is a JSON text message of the form
//! `{"type": "<event>", "data": {...}}`. Outbound frames carry no data.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::events::InboundEvent;
use crate::session::model::channel_value;
use crate::session::LightStatus;

pub const LED_STATUS: &str = "led_status";
pub const VOICE_COMMAND: &str = "voice_command";

/// Frames sent from the client to the controller service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Ask the service to begin capturing voice input
    StartRecording,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Generic envelope, decoded before the payload is interpreted
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VoiceCommandPayload {
    command: String,
}

/// Positional channel keys used by the static-page variant
#[derive(Debug, Deserialize)]
struct LegacyLightStatus {
    #[serde(deserialize_with = "channel_value")]
    led1: i64,
    #[serde(deserialize_with = "channel_value")]
    led2: i64,
    #[serde(deserialize_with = "channel_value")]
    led3: i64,
}

impl From<LegacyLightStatus> for LightStatus {
    fn from(legacy: LegacyLightStatus) -> Self {
        LightStatus::new(legacy.led1, legacy.led2, legacy.led3)
    }
}

/// Turns text frames into inbound events
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    legacy_channels: bool,
}

impl Decoder {
    pub fn new(legacy_channels: bool) -> Self {
        Self { legacy_channels }
    }

    /// Decode one text frame.
    ///
    /// Any shape mismatch is an error; a frame is never partially applied.
    pub fn decode(&self, text: &str) -> Result<InboundEvent, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        match envelope.kind.as_str() {
            LED_STATUS => {
                let data = envelope.data.ok_or(ProtocolError::MissingPayload(LED_STATUS))?;
                self.decode_status(data).map(InboundEvent::LightStatus)
            }
            VOICE_COMMAND => {
                let data = envelope
                    .data
                    .ok_or(ProtocolError::MissingPayload(VOICE_COMMAND))?;
                let payload: VoiceCommandPayload = serde_json::from_value(data)?;
                Ok(InboundEvent::VoiceCommand(payload.command))
            }
            _ => Err(ProtocolError::UnknownEvent(envelope.kind)),
        }
    }

    fn decode_status(&self, data: serde_json::Value) -> Result<LightStatus, ProtocolError> {
        if !self.legacy_channels {
            return Ok(serde_json::from_value(data)?);
        }

        match serde_json::from_value::<LightStatus>(data.clone()) {
            Ok(status) => Ok(status),
            Err(named_err) => serde_json::from_value::<LegacyLightStatus>(data)
                .map(LightStatus::from)
                .map_err(|_| ProtocolError::Json(named_err)),
        }
    }
}
