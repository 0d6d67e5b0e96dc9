//! Line-oriented console front end
//!
//! The views are pure projections of session state; the listener turns
//! stdin lines into actions for the main loop.

mod brightness;
mod channel_view;
mod command_panel;
mod input;

pub use channel_view::ChannelStatusView;
pub use command_panel::CommandPanel;
pub use input::{ConsoleAction, InputListener};
