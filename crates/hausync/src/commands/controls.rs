//! Control listing.

use std::sync::Arc;

use tabled::Tabled;

use hausync_core::{Catalog, Control, Controller};

use crate::cli::{ControlsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ControlRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "★")]
    favorite: &'static str,
}

impl ControlRow {
    fn new(control: &Arc<Control>, catalog: &Catalog) -> Self {
        Self {
            id: control.id.clone(),
            name: control.name.clone(),
            kind: control.kind.as_str().to_owned(),
            room: util::room_name(catalog, control.room.as_deref()),
            category: util::category_name(catalog, control.category.as_deref()),
            favorite: if control.is_favorite { "★" } else { "" },
        }
    }
}

pub fn handle(
    controller: &Controller,
    args: &ControlsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = util::catalog(controller)?;

    let mut controls = match args.room {
        Some(ref needle) => {
            let room = util::resolve_room(&catalog, needle)?;
            catalog.controls_in_room(&room.id)
        }
        None => catalog.all_controls().to_vec(),
    };
    if args.favorites {
        controls.retain(|c| c.is_favorite);
    }

    let out = output::render_list(
        &global.output,
        &controls,
        |c| ControlRow::new(c, &catalog),
        |c| c.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
