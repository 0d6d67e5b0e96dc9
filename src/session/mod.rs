//! Client session: the single owner of light status and recording state
//!
//! Recording phase transitions:
//! - Idle -> Recording: `start_recording()` on a live connection
//! - Recording -> Idle: any voice command, or the optional timeout
//! - Idle -> Idle: a voice command that arrives without a recording

mod controller;
pub(crate) mod model;

pub use controller::SessionController;
pub use model::{LightStatus, Phase, RecordingSession};
