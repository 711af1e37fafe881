//! Command sending.

use hausync_core::{Command, CommandAck, Controller};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    controller: &Controller,
    args: &SendArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command: Command = args.command.parse().map_err(|e: hausync_core::CoreError| {
        CliError::Validation {
            field: "command".into(),
            reason: e.to_string(),
        }
    })?;

    let catalog = util::catalog(controller)?;
    let control = util::resolve_control(&catalog, &args.control)?;
    if control.kind.is_sensor() {
        return Err(CliError::Validation {
            field: "control".into(),
            reason: format!("'{}' is a {} and accepts no commands", control.name, control.kind.as_str()),
        });
    }

    let ack = controller.send_command(&control.id, command).await?;

    let out = output::render_single(
        &global.output,
        &ack,
        |a: &CommandAck| {
            let after = a
                .optimistic
                .map(|v| format!(" ({} -> {})", a.target_state, output::format_value(v)))
                .unwrap_or_default();
            format!("Sent {} to {}{after}", a.wire_command, control.name)
        },
        |a| a.wire_command.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
