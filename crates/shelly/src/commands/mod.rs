//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod device;
pub mod discover;
pub mod run;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(args, global).await,
        Command::Info(args) => device::info(args, global).await,
        Command::Status(args) => device::status(args, global).await,
        Command::Set(args) => device::set(args, global).await,
        Command::Run(args) => run::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
