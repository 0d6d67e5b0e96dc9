//! Session state owned by the controller

use std::time::Instant;

use serde::{Deserialize, Deserializer};

/// Brightness of the three light channels, in percent
///
/// Values are nominally 0..=100. Out-of-range values are kept as received;
/// the display clamps them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LightStatus {
    #[serde(deserialize_with = "channel_value")]
    pub red: i64,
    #[serde(deserialize_with = "channel_value")]
    pub green: i64,
    #[serde(deserialize_with = "channel_value")]
    pub blue: i64,
}

impl LightStatus {
    pub fn new(red: i64, green: i64, blue: i64) -> Self {
        Self { red, green, blue }
    }
}

impl std::fmt::Display for LightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r={} g={} b={}", self.red, self.green, self.blue)
    }
}

/// Decode a channel value from any JSON number.
///
/// The controller scales a 0..1 level by 100 and often sends floats, so
/// non-integers are rounded to the nearest percent.
pub(crate) fn channel_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    match number.as_f64() {
        Some(value) if value.is_finite() => Ok(value.round() as i64),
        _ => Err(serde::de::Error::custom(format!(
            "channel value out of range: {number}"
        ))),
    }
}

/// Recording lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Recording,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Recording => write!(f, "Recording"),
        }
    }
}

/// The voice-command half of the session
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub(crate) phase: Phase,
    pub(crate) last_command: Option<String>,
    /// Set only while `phase == Recording`
    pub(crate) started_at: Option<Instant>,
}

impl RecordingSession {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }
}
