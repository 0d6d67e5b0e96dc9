//! Three-channel light status view

use crate::session::LightStatus;

use super::brightness::Intensity;

const METER_WIDTH: usize = 20;

/// One row of the view
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub label: &'static str,
    pub brightness: i64,
    pub intensity: Intensity,
}

impl ChannelRow {
    fn new(label: &'static str, brightness: i64) -> Self {
        Self {
            label,
            brightness,
            intensity: Intensity::from_brightness(brightness),
        }
    }

    pub fn percent(&self) -> String {
        format!("{}%", self.brightness)
    }
}

/// Read-only projection of a [`LightStatus`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatusView {
    pub rows: [ChannelRow; 3],
}

impl ChannelStatusView {
    pub fn new(status: &LightStatus) -> Self {
        Self {
            rows: [
                ChannelRow::new("Red", status.red),
                ChannelRow::new("Green", status.green),
                ChannelRow::new("Blue", status.blue),
            ],
        }
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push("── Light status ──".to_string());
        for row in &self.rows {
            lines.push(format!(
                "{} {:<6}{} {:>4}",
                row.intensity.glow.symbol(),
                row.label,
                row.intensity.meter(METER_WIDTH),
                row.percent()
            ));
        }
        lines
    }
}
