// ── Structure graph entities ──
//
// Controls, rooms and categories as described by the structure document.
// Every attribute except the id is optional on the wire; absent values
// fall back to empty names, `None`, or `false`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::EnumString;

// ── ControlKind ─────────────────────────────────────────────────────

/// Control type tag. Unknown tags are preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
pub enum ControlKind {
    Switch,
    Pushbutton,
    TimedSwitch,
    Dimmer,
    LightController,
    LightControllerV2,
    Jalousie,
    CentralJalousie,
    Gate,
    InfoOnlyAnalog,
    InfoOnlyDigital,
    Meter,
    IRoomControllerV2,
    #[strum(default)]
    Other(String),
}

impl ControlKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Switch => "Switch",
            Self::Pushbutton => "Pushbutton",
            Self::TimedSwitch => "TimedSwitch",
            Self::Dimmer => "Dimmer",
            Self::LightController => "LightController",
            Self::LightControllerV2 => "LightControllerV2",
            Self::Jalousie => "Jalousie",
            Self::CentralJalousie => "CentralJalousie",
            Self::Gate => "Gate",
            Self::InfoOnlyAnalog => "InfoOnlyAnalog",
            Self::InfoOnlyDigital => "InfoOnlyDigital",
            Self::Meter => "Meter",
            Self::IRoomControllerV2 => "IRoomControllerV2",
            Self::Other(tag) => tag,
        }
    }

    /// Read-only kinds that never accept commands.
    pub fn is_sensor(&self) -> bool {
        matches!(self, Self::InfoOnlyAnalog | Self::InfoOnlyDigital | Self::Meter)
    }
}

impl Default for ControlKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ControlKind {
    fn from(tag: String) -> Self {
        tag.parse().unwrap_or(Self::Other(tag))
    }
}

impl From<ControlKind> for String {
    fn from(kind: ControlKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl Serialize for ControlKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ControlKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

// ── StateRef ────────────────────────────────────────────────────────

/// A named state slot: usually one state id, occasionally a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    One(String),
    Many(Vec<String>),
}

impl StateRef {
    /// The first (primary) state id.
    pub fn primary(&self) -> Option<&str> {
        match self {
            Self::One(id) => Some(id),
            Self::Many(ids) => ids.first().map(String::as_str),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::One(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        };
        slice.iter().map(String::as_str)
    }
}

// ── Control ─────────────────────────────────────────────────────────

/// A controllable or observable device function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    pub id: String,
    pub name: String,
    pub kind: ControlKind,
    pub room: Option<String>,
    pub category: Option<String>,
    /// Semantic state name (`active`, `value`, `position`, ...) to state id.
    pub states: BTreeMap<String, StateRef>,
    pub sub_controls: Vec<Control>,
    pub is_favorite: bool,
    pub is_secured: bool,
    pub default_rating: Option<i64>,
}

impl Control {
    /// Primary state id for a semantic state name.
    pub fn state(&self, name: &str) -> Option<&str> {
        self.states.get(name).and_then(StateRef::primary)
    }

    /// Every state id this control references (not including sub-controls).
    pub fn state_ids(&self) -> impl Iterator<Item = &str> {
        self.states.values().flat_map(StateRef::ids)
    }

    /// Depth-first iteration over this control and all nested sub-controls.
    pub fn walk(&self) -> Vec<&Control> {
        let mut out = vec![self];
        for sub in &self.sub_controls {
            out.extend(sub.walk());
        }
        out
    }
}

// ── Room / Category ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub kind: Option<i64>,
    pub default_rating: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub color: Option<String>,
    pub kind: Option<String>,
}

// ── ControllerInfo ──────────────────────────────────────────────────

/// Identity block of the structure document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerInfo {
    pub name: Option<String>,
    pub project_name: Option<String>,
    pub serial: Option<String>,
    pub local_url: Option<String>,
    pub remote_url: Option<String>,
    pub last_modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_parse_and_unknown_are_preserved() {
        assert_eq!(ControlKind::from("Jalousie".to_owned()), ControlKind::Jalousie);
        assert_eq!(
            ControlKind::from("AalSmartAlarm".to_owned()),
            ControlKind::Other("AalSmartAlarm".into())
        );
        assert_eq!(ControlKind::Other("AalSmartAlarm".into()).to_string(), "AalSmartAlarm");
    }

    #[test]
    fn state_ref_primary_and_ids() {
        let one = StateRef::One("a".into());
        let many = StateRef::Many(vec!["b".into(), "c".into()]);
        assert_eq!(one.primary(), Some("a"));
        assert_eq!(many.primary(), Some("b"));
        assert_eq!(many.ids().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(StateRef::Many(Vec::new()).primary(), None);
    }
}
