//! Voice command panel

use crate::session::{Phase, RecordingSession};

pub const START_LABEL: &str = "Start voice command";
pub const RECORDING_LABEL: &str = "Listening...";
pub const RECORDING_HINT: &str = "Speak your command now.";
pub const NO_COMMAND_PLACEHOLDER: &str = "No commands yet.";

/// Read-only projection of a [`RecordingSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPanel {
    /// The start control is usable only while idle
    pub button_enabled: bool,
    pub button_label: &'static str,
    pub hint_visible: bool,
    pub last_command: String,
}

impl CommandPanel {
    pub fn new(phase: Phase, last_command: Option<&str>) -> Self {
        let recording = phase == Phase::Recording;
        Self {
            button_enabled: !recording,
            button_label: if recording { RECORDING_LABEL } else { START_LABEL },
            hint_visible: recording,
            last_command: last_command
                .filter(|command| !command.is_empty())
                .unwrap_or(NO_COMMAND_PLACEHOLDER)
                .to_string(),
        }
    }

    pub fn from_session(session: &RecordingSession) -> Self {
        Self::new(session.phase(), session.last_command())
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = vec!["── Voice command ──".to_string()];
        if self.button_enabled {
            lines.push(format!("[r] {}", self.button_label));
        } else {
            lines.push(format!("( ) {}", self.button_label));
        }
        if self.hint_visible {
            lines.push(format!("    {}", RECORDING_HINT));
        }
        lines.push(format!("Last command: {}", self.last_command));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_panel() {
        let panel = CommandPanel::new(Phase::Idle, None);
        assert!(panel.button_enabled);
        assert_eq!(panel.button_label, START_LABEL);
        assert!(!panel.hint_visible);
        assert_eq!(panel.last_command, NO_COMMAND_PLACEHOLDER);
    }

    #[test]
    fn test_recording_panel_disables_button() {
        let panel = CommandPanel::new(Phase::Recording, Some("turn on red"));
        assert!(!panel.button_enabled);
        assert_eq!(panel.button_label, RECORDING_LABEL);
        assert!(panel.hint_visible);
        assert_eq!(panel.last_command, "turn on red");

        let lines = panel.render();
        assert!(lines.iter().any(|line| line.contains(RECORDING_HINT)));
        assert!(!lines.iter().any(|line| line.starts_with("[r]")));
    }

    #[test]
    fn test_empty_command_shows_placeholder() {
        let panel = CommandPanel::new(Phase::Idle, Some(""));
        assert_eq!(panel.last_command, NO_COMMAND_PLACEHOLDER);
    }

    #[test]
    fn test_from_session() {
        let panel = CommandPanel::from_session(&RecordingSession::default());
        assert_eq!(panel, CommandPanel::new(Phase::Idle, None));
    }
}
