//! Last-known location and speed for the collector.
//!
//! Speed comes from the fix itself when the provider reports a positive value, and is
//! otherwise derived from the distance covered since the previous fix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::haversine_distance;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub time: DateTime<Utc>,
    /// Provider speed in m/s, if the provider reported one.
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedState {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub last_fix_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedSource {
    /// First fix seen; adopted as-is.
    Initial,
    /// Positive speed reported by the provider.
    Provider,
    /// Distance over elapsed time since the previous fix.
    Derived,
    /// Elapsed time was zero or negative; previous speed kept.
    HeldZeroDuration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedUpdate {
    pub state: SpeedState,
    pub source: SpeedSource,
}

#[derive(Debug, Default)]
pub struct SpeedEstimator {
    state: Option<SpeedState>,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the first fix arrives.
    pub fn current(&self) -> Option<&SpeedState> {
        self.state.as_ref()
    }

    pub fn update(&mut self, fix: LocationFix) -> SpeedUpdate {
        let Some(previous) = self.state else {
            let state = SpeedState {
                latitude: fix.latitude,
                longitude: fix.longitude,
                speed: sanitize(fix.speed.unwrap_or(0.0)).unwrap_or(0.0),
                last_fix_time: fix.time,
            };
            self.state = Some(state);
            return SpeedUpdate {
                state,
                source: SpeedSource::Initial,
            };
        };

        let (speed, source) = match fix.speed.and_then(sanitize) {
            Some(reported) if reported > 0.0 => (reported, SpeedSource::Provider),
            _ => derive_speed(&previous, &fix),
        };

        let state = SpeedState {
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed,
            last_fix_time: fix.time,
        };
        self.state = Some(state);
        SpeedUpdate { state, source }
    }
}

fn derive_speed(previous: &SpeedState, fix: &LocationFix) -> (f64, SpeedSource) {
    let elapsed_ms = (fix.time - previous.last_fix_time).num_milliseconds();
    if elapsed_ms <= 0 {
        return (previous.speed, SpeedSource::HeldZeroDuration);
    }

    let distance = haversine_distance(
        previous.latitude,
        previous.longitude,
        fix.latitude,
        fix.longitude,
    );
    let speed = distance / (elapsed_ms as f64 / 1000.0);
    match sanitize(speed) {
        Some(speed) => (speed, SpeedSource::Derived),
        None => (previous.speed, SpeedSource::HeldZeroDuration),
    }
}

fn sanitize(speed: f64) -> Option<f64> {
    (speed.is_finite() && speed >= 0.0).then_some(speed)
}
