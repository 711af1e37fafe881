//! State read: fetch a control's states (or one raw state id) over HTTP.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use hausync_core::Controller;

use crate::cli::{GlobalOpts, StateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct StateView {
    /// Semantic name within the control (`active`, `value`, ...).
    name: String,
    id: String,
    value: Option<f64>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "State")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn handle(
    controller: &Controller,
    args: &StateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = util::catalog(controller)?;

    // A control expands to its named states; anything else is a raw id.
    let slots: Vec<(String, String)> = match util::resolve_control(&catalog, &args.id) {
        Ok(control) => control
            .states
            .iter()
            .flat_map(|(name, state)| state.ids().map(move |id| (name.clone(), id.to_owned())))
            .collect(),
        Err(CliError::NotFound { .. }) => vec![("-".to_owned(), args.id.clone())],
        Err(e) => return Err(e),
    };

    let ids: Vec<String> = slots.iter().map(|(_, id)| id.clone()).collect();
    let report = controller.refresh(&ids).await?;
    if report.observed == 0 {
        if let Some(first) = report.errors.first() {
            return Err(CliError::Controller {
                code: "state_read".into(),
                message: format!("{}: {}", first.id, first.message),
            });
        }
    }
    for failure in &report.errors {
        tracing::warn!(id = %failure.id, error = %failure.message, "state read failed");
    }

    let views: Vec<StateView> = slots
        .into_iter()
        .map(|(name, id)| {
            let state = controller.state(&id);
            StateView {
                name,
                value: state.as_ref().map(|s| s.value),
                updated_at: state.map(|s| s.updated_at),
                id,
            }
        })
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &views,
        |v| StateRow {
            name: v.name.clone(),
            id: v.id.clone(),
            value: v
                .value
                .map_or_else(|| "?".to_owned(), |x| output::paint_value(x, color)),
        },
        |v| v.value.map(output::format_value).unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
