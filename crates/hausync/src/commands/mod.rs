//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod controls;
pub mod rooms;
pub mod send;
pub mod state;
pub mod util;
pub mod watch;

use hausync_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Rooms => rooms::handle(controller, global),
        Command::Controls(args) => controls::handle(controller, &args, global),
        Command::State(args) => state::handle(controller, &args, global).await,
        Command::Send(args) => send::handle(controller, &args, global).await,
        Command::Watch(args) => watch::handle(controller, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
