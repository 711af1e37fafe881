// ── Structure catalog ──
//
// Immutable lookup tables built from the structure document. A new
// `Catalog` is built on every successful structure fetch and swapped in
// wholesale; nothing mutates one after `load`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Category, Control, ControlKind, ControllerInfo, Room, StateRef};

/// The structure document could not be turned into a catalog.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("Malformed structure document: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    ms_info: Option<RawInfo>,
    #[serde(default)]
    rooms: HashMap<String, RawRoom>,
    #[serde(default)]
    cats: HashMap<String, RawCategory>,
    controls: HashMap<String, RawControl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInfo {
    ms_name: Option<String>,
    project_name: Option<String>,
    serial_nr: Option<String>,
    local_url: Option<String>,
    remote_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoom {
    #[serde(default)]
    name: String,
    image: Option<String>,
    #[serde(rename = "type")]
    kind: Option<i64>,
    default_rating: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    name: String,
    image: Option<String>,
    color: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawControl {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: ControlKind,
    room: Option<String>,
    cat: Option<String>,
    #[serde(default)]
    states: BTreeMap<String, StateRef>,
    #[serde(default)]
    sub_controls: HashMap<String, RawControl>,
    #[serde(default)]
    is_favorite: bool,
    #[serde(default)]
    is_secured: bool,
    default_rating: Option<i64>,
}

impl RawControl {
    /// Inject the map key as the id, recursively.
    fn into_control(self, id: String) -> Control {
        let mut sub_controls: Vec<Control> = self
            .sub_controls
            .into_iter()
            .map(|(sub_id, raw)| raw.into_control(sub_id))
            .collect();
        sub_controls.sort_by(by_name);

        Control {
            id,
            name: self.name,
            kind: self.kind,
            room: self.room,
            category: self.cat,
            states: self.states,
            sub_controls,
            is_favorite: self.is_favorite,
            is_secured: self.is_secured,
            default_rating: self.default_rating,
        }
    }
}

fn by_name(a: &Control, b: &Control) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Read-only view of rooms, categories and controls.
#[derive(Debug, Default)]
pub struct Catalog {
    info: ControllerInfo,
    rooms: Vec<Arc<Room>>,
    categories: Vec<Arc<Category>>,
    /// Top-level controls ordered by display name.
    controls: Vec<Arc<Control>>,
    /// Every control, nested ones included, by id.
    by_id: HashMap<String, Arc<Control>>,
}

impl Catalog {
    /// Build a catalog from a parsed structure document.
    pub fn load(document: serde_json::Value) -> Result<Self, StructureError> {
        let raw: RawDocument = serde_json::from_value(document)?;
        Ok(Self::from_raw(raw))
    }

    /// Build a catalog from structure document text.
    pub fn from_json(text: &str) -> Result<Self, StructureError> {
        let raw: RawDocument = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawDocument) -> Self {
        let info = raw
            .ms_info
            .map(|i| ControllerInfo {
                name: i.ms_name,
                project_name: i.project_name,
                serial: i.serial_nr,
                local_url: i.local_url,
                remote_url: i.remote_url,
                last_modified: None,
            })
            .unwrap_or_default();
        let info = ControllerInfo {
            last_modified: raw.last_modified,
            ..info
        };

        let mut rooms: Vec<Arc<Room>> = raw
            .rooms
            .into_iter()
            .map(|(id, r)| {
                Arc::new(Room {
                    id,
                    name: r.name,
                    image: r.image,
                    kind: r.kind,
                    default_rating: r.default_rating,
                })
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut categories: Vec<Arc<Category>> = raw
            .cats
            .into_iter()
            .map(|(id, c)| {
                Arc::new(Category {
                    id,
                    name: c.name,
                    image: c.image,
                    color: c.color,
                    kind: c.kind,
                })
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut top: Vec<Control> = raw
            .controls
            .into_iter()
            .map(|(id, c)| c.into_control(id))
            .collect();
        top.sort_by(by_name);

        let mut by_id = HashMap::new();
        for control in &top {
            for nested in control.walk().into_iter().skip(1) {
                by_id.insert(nested.id.clone(), Arc::new(nested.clone()));
            }
        }
        let controls: Vec<Arc<Control>> = top.into_iter().map(Arc::new).collect();
        for control in &controls {
            by_id.insert(control.id.clone(), Arc::clone(control));
        }

        Self {
            info,
            rooms,
            categories,
            controls,
            by_id,
        }
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    // ── Controls ─────────────────────────────────────────────────────

    /// Look up any control, nested sub-controls included.
    pub fn control(&self, id: &str) -> Option<Arc<Control>> {
        self.by_id.get(id).cloned()
    }

    /// Top-level controls ordered by display name.
    pub fn all_controls(&self) -> &[Arc<Control>] {
        &self.controls
    }

    pub fn controls_in_room(&self, room_id: &str) -> Vec<Arc<Control>> {
        self.controls
            .iter()
            .filter(|c| c.room.as_deref() == Some(room_id))
            .cloned()
            .collect()
    }

    pub fn controls_in_category(&self, category_id: &str) -> Vec<Arc<Control>> {
        self.controls
            .iter()
            .filter(|c| c.category.as_deref() == Some(category_id))
            .cloned()
            .collect()
    }

    pub fn favorites(&self) -> Vec<Arc<Control>> {
        self.controls.iter().filter(|c| c.is_favorite).cloned().collect()
    }

    // ── Rooms & categories ───────────────────────────────────────────

    pub fn room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.iter().find(|r| r.id == id).cloned()
    }

    /// Case-insensitive room lookup by id or display name.
    pub fn find_room(&self, needle: &str) -> Option<Arc<Room>> {
        self.room(needle).or_else(|| {
            self.rooms
                .iter()
                .find(|r| r.name.eq_ignore_ascii_case(needle))
                .cloned()
        })
    }

    pub fn rooms(&self) -> &[Arc<Room>] {
        &self.rooms
    }

    pub fn category(&self, id: &str) -> Option<Arc<Category>> {
        self.categories.iter().find(|c| c.id == id).cloned()
    }

    pub fn categories(&self) -> &[Arc<Category>] {
        &self.categories
    }

    // ── State ids ────────────────────────────────────────────────────

    /// Every state id referenced anywhere in the catalog, de-duplicated.
    pub fn state_ids(&self) -> Vec<String> {
        Self::collect_state_ids(&self.controls)
    }

    /// State ids of a subset of controls (sub-controls included).
    pub fn state_ids_for(controls: &[Arc<Control>]) -> Vec<String> {
        Self::collect_state_ids(controls)
    }

    fn collect_state_ids(controls: &[Arc<Control>]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for control in controls {
            for c in control.walk() {
                for id in std::iter::once(c.id.as_str()).chain(c.state_ids()) {
                    if seen.insert(id) {
                        out.push(id.to_owned());
                    }
                }
            }
        }
        out
    }
}
