// ── Command dispatch ──
//
// Turns a high-level `Command` aimed at a control into a wire command,
// sends it, writes the expected value into the store right away, and
// schedules a re-read that overwrites the guess with the controller's
// answer once the hardware has settled.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use hausync_api::HttpClient;

use crate::error::CoreError;
use crate::model::Control;
use crate::store::StateStore;

// ── Command ─────────────────────────────────────────────────────────

/// The fixed vocabulary of control commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Toggle,
    On,
    Off,
    Pulse,
    /// Dimmer / position level in percent; clamped to `0..=100`.
    SetLevel(f64),
    Up,
    Down,
    FullUp,
    FullDown,
    Stop,
}

/// Resolution group of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Switch,
    Level,
    Jalousie,
}

impl CommandKind {
    /// State names tried in order when resolving the target state id. The
    /// control's own id is the final fallback.
    pub fn state_priority(self) -> &'static [&'static str] {
        match self {
            Self::Switch => &["active"],
            Self::Level => &["position", "value"],
            Self::Jalousie => &["position"],
        }
    }
}

impl Command {
    pub fn kind(self) -> CommandKind {
        match self {
            Self::Toggle | Self::On | Self::Off | Self::Pulse => CommandKind::Switch,
            Self::SetLevel(_) => CommandKind::Level,
            Self::Up | Self::Down | Self::FullUp | Self::FullDown | Self::Stop => {
                CommandKind::Jalousie
            }
        }
    }

    /// Wire command and the value the target state should take if the
    /// controller accepts it. `current` is only consulted by `Toggle`.
    pub fn to_wire(self, current: Option<f64>) -> (String, Option<f64>) {
        match self {
            Self::Toggle => {
                if current.is_some_and(|v| v > 0.0) {
                    ("Off".into(), Some(0.0))
                } else {
                    ("On".into(), Some(1.0))
                }
            }
            Self::On => ("On".into(), Some(1.0)),
            Self::Off => ("Off".into(), Some(0.0)),
            Self::Pulse => ("Pulse".into(), None),
            Self::SetLevel(level) => {
                let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 100.0) };
                (format!("{level}"), Some(level))
            }
            Self::Up => ("up".into(), None),
            Self::Down => ("down".into(), None),
            Self::FullUp => ("FullUp".into(), None),
            Self::FullDown => ("FullDown".into(), None),
            Self::Stop => ("stop".into(), None),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle => f.write_str("toggle"),
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Pulse => f.write_str("pulse"),
            Self::SetLevel(level) => write!(f, "{level}"),
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
            Self::FullUp => f.write_str("fullup"),
            Self::FullDown => f.write_str("fulldown"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

impl FromStr for Command {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = match s.trim().to_ascii_lowercase().as_str() {
            "toggle" => Self::Toggle,
            "on" => Self::On,
            "off" => Self::Off,
            "pulse" => Self::Pulse,
            "up" => Self::Up,
            "down" => Self::Down,
            "fullup" | "full-up" => Self::FullUp,
            "fulldown" | "full-down" => Self::FullDown,
            "stop" => Self::Stop,
            other => match other.trim_end_matches('%').parse::<f64>() {
                Ok(level) if level.is_finite() => Self::SetLevel(level),
                _ => {
                    return Err(CoreError::CommandFailed(format!(
                        "unknown command {s:?} (expected toggle, on, off, pulse, up, down, \
                         fullup, fulldown, stop, or a level 0-100)"
                    )));
                }
            },
        };
        Ok(cmd)
    }
}

/// Pick the state id a command acts on.
pub fn resolve_target(control_id: &str, control: Option<&Control>, command: Command) -> String {
    control
        .and_then(|c| {
            command
                .kind()
                .state_priority()
                .iter()
                .find_map(|name| c.state(name))
        })
        .unwrap_or(control_id)
        .to_owned()
}

// ── CommandAck ──────────────────────────────────────────────────────

/// What a successful send did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandAck {
    pub control_id: String,
    /// State id the optimistic write and reconciliation apply to.
    pub target_state: String,
    pub wire_command: String,
    /// Value written to the store before reconciliation, if any.
    pub optimistic: Option<f64>,
}

// ── CommandDispatcher ───────────────────────────────────────────────

/// Settings for dispatch timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Wait before re-reading the target state after a command.
    pub settle_delay: Duration,
    /// Quiet window for [`CommandDispatcher::send_debounced`].
    pub debounce_window: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            debounce_window: Duration::from_millis(300),
        }
    }
}

pub struct CommandDispatcher {
    store: Arc<StateStore>,
    settings: DispatchSettings,
    /// Pending debounced sends per control: generation + cancel handle.
    pending: Mutex<HashMap<String, (u64, CancellationToken)>>,
    generation: Mutex<u64>,
    tracker: TaskTracker,
}

impl CommandDispatcher {
    pub fn new(store: Arc<StateStore>, settings: DispatchSettings) -> Self {
        Self {
            store,
            settings,
            pending: Mutex::new(HashMap::new()),
            generation: Mutex::new(0),
            tracker: TaskTracker::new(),
        }
    }

    /// Resolve, send, write optimistically, and schedule reconciliation.
    ///
    /// `cancel` bounds the reconciliation task.
    pub async fn send(
        &self,
        http: Arc<HttpClient>,
        control_id: &str,
        control: Option<&Control>,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<CommandAck, CoreError> {
        let target = resolve_target(control_id, control, command);

        let mut current = self.store.value(&target);
        if current.is_none() && command == Command::Toggle {
            match http.fetch_state(&target).await {
                Ok(value) => {
                    self.store.update(&target, value);
                    current = Some(value);
                }
                Err(e) if e.is_auth() => return Err(e.into()),
                Err(e) => debug!(target = %target, error = %e, "current value unavailable"),
            }
        }

        let (wire, intended) = command.to_wire(current);
        info!(control_id, command = %wire, target = %target, "sending command");
        http.send_command(control_id, &wire).await?;

        if let Some(value) = intended {
            self.store.update(&target, value);
        }

        self.reconcile(http, target.clone(), cancel.child_token());

        Ok(CommandAck {
            control_id: control_id.to_owned(),
            target_state: target,
            wire_command: wire,
            optimistic: intended,
        })
    }

    /// Like [`send`](Self::send), but collapses calls for the same control
    /// that arrive within the debounce window: every earlier pending call
    /// resolves to `Ok(None)` and only the last one is transmitted.
    pub async fn send_debounced(
        &self,
        http: Arc<HttpClient>,
        control_id: &str,
        control: Option<&Control>,
        command: Command,
        cancel: &CancellationToken,
    ) -> Result<Option<CommandAck>, CoreError> {
        let token = cancel.child_token();
        let generation = {
            let mut counter = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *counter += 1;
            *counter
        };
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, previous)) =
                pending.insert(control_id.to_owned(), (generation, token.clone()))
            {
                previous.cancel();
            }
        }

        let fired = tokio::select! {
            biased;
            () = token.cancelled() => false,
            () = tokio::time::sleep(self.settings.debounce_window) => true,
        };

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.get(control_id).is_some_and(|(g, _)| *g == generation) {
                pending.remove(control_id);
            }
        }

        if !fired {
            debug!(control_id, "debounced command superseded");
            return Ok(None);
        }
        self.send(http, control_id, control, command, cancel).await.map(Some)
    }

    fn reconcile(&self, http: Arc<HttpClient>, target: String, cancel: CancellationToken) {
        let store = Arc::clone(&self.store);
        let delay = self.settings.settle_delay;

        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                r = http.fetch_state(&target) => r,
            };
            match result {
                Ok(value) => {
                    debug!(target = %target, value, "reconciled state after command");
                    store.update(&target, value);
                }
                Err(e) => warn!(target = %target, error = %e, "reconciliation read failed"),
            }
        });
    }

    /// Wait for every outstanding reconciliation task.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{ControlKind, StateRef};

    fn control(states: &[(&str, &str)]) -> Control {
        Control {
            id: "ctl".into(),
            name: "Ctl".into(),
            kind: ControlKind::Switch,
            room: None,
            category: None,
            states: states
                .iter()
                .map(|(k, v)| ((*k).to_owned(), StateRef::One((*v).to_owned())))
                .collect::<BTreeMap<_, _>>(),
            sub_controls: Vec::new(),
            is_favorite: false,
            is_secured: false,
            default_rating: None,
        }
    }

    #[test]
    fn resolution_table() {
        let c = control(&[("active", "st-a"), ("position", "st-p"), ("value", "st-v")]);
        assert_eq!(resolve_target("ctl", Some(&c), Command::Toggle), "st-a");
        assert_eq!(resolve_target("ctl", Some(&c), Command::SetLevel(5.0)), "st-p");
        assert_eq!(resolve_target("ctl", Some(&c), Command::FullDown), "st-p");

        let value_only = control(&[("value", "st-v")]);
        assert_eq!(resolve_target("ctl", Some(&value_only), Command::SetLevel(5.0)), "st-v");
        assert_eq!(resolve_target("ctl", Some(&value_only), Command::On), "ctl");
        assert_eq!(resolve_target("ctl", None, Command::Up), "ctl");
    }

    #[test]
    fn toggle_inverts_current_value() {
        assert_eq!(Command::Toggle.to_wire(Some(1.0)), ("Off".into(), Some(0.0)));
        assert_eq!(Command::Toggle.to_wire(Some(0.0)), ("On".into(), Some(1.0)));
        assert_eq!(Command::Toggle.to_wire(None), ("On".into(), Some(1.0)));
    }

    #[test]
    fn set_level_is_clamped() {
        assert_eq!(Command::SetLevel(150.0).to_wire(None), ("100".into(), Some(100.0)));
        assert_eq!(Command::SetLevel(-3.0).to_wire(None), ("0".into(), Some(0.0)));
        assert_eq!(Command::SetLevel(42.5).to_wire(None), ("42.5".into(), Some(42.5)));
    }

    #[test]
    fn parses_command_words_and_levels() {
        assert_eq!("Toggle".parse::<Command>().unwrap(), Command::Toggle);
        assert_eq!("full-down".parse::<Command>().unwrap(), Command::FullDown);
        assert_eq!("75%".parse::<Command>().unwrap(), Command::SetLevel(75.0));
        assert!("explode".parse::<Command>().is_err());
        assert!("NaN".parse::<Command>().is_err());
    }
}
