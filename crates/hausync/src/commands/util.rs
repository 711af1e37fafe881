//! Shared helpers for command handlers.

use std::sync::Arc;

use hausync_core::{Catalog, Control, Controller, Room};

use crate::error::CliError;

/// The loaded catalog; every controller-bound command connects first.
pub fn catalog(controller: &Controller) -> Result<Arc<Catalog>, CliError> {
    controller.structure().ok_or_else(|| CliError::ConnectionFailed {
        reason: "structure document not loaded".into(),
    })
}

/// Resolve a room by id or (case-insensitive) name.
pub fn resolve_room(catalog: &Catalog, needle: &str) -> Result<Arc<Room>, CliError> {
    catalog.find_room(needle).ok_or_else(|| CliError::NotFound {
        resource_type: "room".into(),
        identifier: needle.into(),
        list_command: "rooms".into(),
    })
}

/// Resolve a control by id, or by name when exactly one control has it.
pub fn resolve_control(catalog: &Catalog, needle: &str) -> Result<Arc<Control>, CliError> {
    if let Some(control) = catalog.control(needle) {
        return Ok(control);
    }

    let mut named = catalog
        .all_controls()
        .iter()
        .filter(|c| c.name.eq_ignore_ascii_case(needle));
    match (named.next(), named.next()) {
        (Some(control), None) => Ok(Arc::clone(control)),
        (Some(_), Some(_)) => Err(CliError::Validation {
            field: "control".into(),
            reason: format!("'{needle}' names more than one control; use its id"),
        }),
        (None, _) => Err(CliError::NotFound {
            resource_type: "control".into(),
            identifier: needle.into(),
            list_command: "controls".into(),
        }),
    }
}

/// Display name of a room id, or an empty string.
pub fn room_name(catalog: &Catalog, room_id: Option<&str>) -> String {
    room_id
        .and_then(|id| catalog.room(id))
        .map(|room| room.name.clone())
        .unwrap_or_default()
}

pub fn category_name(catalog: &Catalog, category_id: Option<&str>) -> String {
    category_id
        .and_then(|id| catalog.category(id))
        .map(|cat| cat.name.clone())
        .unwrap_or_default()
}
