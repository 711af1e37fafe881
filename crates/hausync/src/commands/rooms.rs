//! Room command handler.

use std::sync::Arc;

use tabled::Tabled;

use hausync_core::{Catalog, Controller, Room};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Controls")]
    controls: usize,
}

impl RoomRow {
    fn new(room: &Arc<Room>, catalog: &Catalog) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            controls: catalog.controls_in_room(&room.id).len(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = util::catalog(controller)?;
    let out = output::render_list(
        &global.output,
        catalog.rooms(),
        |r| RoomRow::new(r, &catalog),
        |r| r.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
