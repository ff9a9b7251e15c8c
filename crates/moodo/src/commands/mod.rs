//! Command handlers, one module per command family.

pub mod boxes;
pub mod config_cmd;
pub mod control;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the Moodo API.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Boxes(args) => boxes::handle(args, global).await,
        Command::Power { key, state } => control::power(key, state, global).await,
        Command::Intensity { key, value } => control::intensity(key, value, global).await,
        Command::Slot(args) => control::slot(args, global).await,
        Command::Watch(args) => watch::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "completions are generated without the API".into(),
        }),
    }
}
