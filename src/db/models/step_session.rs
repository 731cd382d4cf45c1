//! Step session data model.
//!
//! One row per reconciled counter reading. `step_count` is the running total at the
//! time of the reading, never a delta.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::SpeedState;

/// A persisted ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepSession {
    pub id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub step_count: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub synced: bool,
}

/// A row waiting to be appended. The ledger assigns the id and always stores `synced = 0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewStepSession {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub step_count: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

impl NewStepSession {
    /// Row with unknown location (`0, 0`) and zero speed.
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>, step_count: u64) -> Self {
        Self {
            start_date,
            end_date,
            step_count,
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
        }
    }

    pub fn with_location(mut self, location: Option<&SpeedState>) -> Self {
        if let Some(state) = location {
            self.latitude = state.latitude;
            self.longitude = state.longitude;
            self.speed = state.speed;
        }
        self
    }

    pub(crate) fn into_stored(self, id: i64) -> StepSession {
        StepSession {
            id,
            start_date: self.start_date,
            end_date: self.end_date,
            step_count: self.step_count,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            synced: false,
        }
    }
}
