pub mod app;
pub mod commands;
pub mod prompt;
mod render;

pub use app::App;
pub use commands::{Cli, Commands, CredsAction, StartArgs, UserAction};
pub use prompt::TerminalPrompt;
