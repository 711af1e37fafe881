use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest observed value of one state id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub id: String,
    pub value: f64,
    /// Arrival time of the update that produced `value`.
    pub updated_at: DateTime<Utc>,
}

impl DeviceState {
    pub fn new(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value,
            updated_at: Utc::now(),
        }
    }

    /// `true` when the value is strictly positive.
    pub fn is_on(&self) -> bool {
        self.value > 0.0
    }
}
