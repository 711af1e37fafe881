//! Live state streaming.
//!
//! Prints one line per state update until Ctrl-C, `--count` updates, or
//! the realtime channel gives up reconnecting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;

use hausync_core::{Catalog, ConnectionState, Controller, DeviceState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct UpdateEvent<'a> {
    id: &'a str,
    control: Option<&'a str>,
    state: Option<&'a str>,
    value: f64,
    at: DateTime<Utc>,
}

/// State id -> (control name, state name).
fn labels(catalog: &Catalog) -> HashMap<String, (String, String)> {
    let mut out = HashMap::new();
    for top in catalog.all_controls() {
        for control in top.walk() {
            for (state_name, state) in &control.states {
                for id in state.ids() {
                    out.entry(id.to_owned())
                        .or_insert_with(|| (control.name.clone(), state_name.clone()));
                }
            }
        }
    }
    out
}

fn render_event(
    format: &OutputFormat,
    event: &UpdateEvent<'_>,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true),
        OutputFormat::Yaml => Ok(format!("---\n{}", output::render_yaml(event)?)),
        OutputFormat::Plain => Ok(format!("{} {}", event.id, output::format_value(event.value))),
        OutputFormat::Table => {
            let label = match (event.control, event.state) {
                (Some(control), Some(state)) => format!("{control} / {state}"),
                _ => event.id.to_owned(),
            };
            Ok(format!(
                "{}  {}  {}",
                event.at.format("%H:%M:%S%.3f"),
                output::paint_label(&label, color),
                output::paint_value(event.value, color)
            ))
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = util::catalog(controller)?;
    if let Some(ref needle) = args.room {
        let room = util::resolve_room(&catalog, needle)?;
        controller.set_current_room(Some(&room.id)).await?;
        if !global.quiet {
            eprintln!("Polling room {}", room.name);
        }
    }

    let labels = labels(&catalog);
    let color = output::should_color(&global.color);
    let mut connection = controller.connection_state();

    let subscription = controller.subscribe_states();
    // Arrival time of the last printed update per id.
    let mut printed: HashMap<String, DateTime<Utc>> = subscription
        .current()
        .values()
        .map(|s| (s.id.clone(), s.updated_at))
        .collect();
    let mut updates = subscription.into_stream();
    let mut emitted = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                tracing::info!(state = %state, "connection state");
                if state == ConnectionState::Disconnected {
                    return Err(CliError::ConnectionFailed {
                        reason: "realtime channel closed and reconnects were exhausted".into(),
                    });
                }
            }
            next = updates.next() => {
                let Some(table) = next else { break };

                let mut fresh: Vec<&DeviceState> = table
                    .values()
                    .filter(|s| printed.get(&s.id).is_none_or(|at| s.updated_at > *at))
                    .collect();
                fresh.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));

                for state in fresh {
                    printed.insert(state.id.clone(), state.updated_at);
                    let label = labels.get(&state.id);
                    let event = UpdateEvent {
                        id: &state.id,
                        control: label.map(|(c, _)| c.as_str()),
                        state: label.map(|(_, s)| s.as_str()),
                        value: state.value,
                        at: state.updated_at,
                    };
                    output::print_output(&render_event(&global.output, &event, color)?, global.quiet);

                    emitted += 1;
                    if args.count.is_some_and(|n| emitted >= n) {
                        return Ok(());
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{
                "controls": {
                    "lamp": { "name": "Lamp", "type": "Switch", "states": { "active": "s-1" } },
                    "blind": {
                        "name": "Blind", "type": "Jalousie",
                        "states": { "position": "s-2", "extra": ["s-3", "s-4"] }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn labels_cover_every_state_id() {
        let labels = labels(&catalog());
        assert_eq!(labels["s-1"], ("Lamp".to_owned(), "active".to_owned()));
        assert_eq!(labels["s-4"], ("Blind".to_owned(), "extra".to_owned()));
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn events_render_per_format() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let event = UpdateEvent {
            id: "s-1",
            control: Some("Lamp"),
            state: Some("active"),
            value: 1.0,
            at,
        };

        let line = render_event(&OutputFormat::Table, &event, false).unwrap();
        assert_eq!(line, "12:00:00.000  Lamp / active  1");

        let plain = render_event(&OutputFormat::Plain, &event, false).unwrap();
        assert_eq!(plain, "s-1 1");

        let json = render_event(&OutputFormat::Json, &event, false).unwrap();
        assert!(json.starts_with(r#"{"id":"s-1","control":"Lamp""#));
        assert!(!json.contains('\n'));
    }
}
