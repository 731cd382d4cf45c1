use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CollectorStatus {
    #[default]
    Stopped,
    Running,
}

/// Observability events broadcast by the collector.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CollectorEvent {
    #[serde(rename_all = "camelCase")]
    Started { start_date: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    BaselineEstablished { cumulative_count: u64 },
    #[serde(rename_all = "camelCase")]
    RowAppended { id: i64, step_count: u64 },
    #[serde(rename_all = "camelCase")]
    CounterReset {
        previous: u64,
        current: u64,
        credited: u64,
    },
    /// A reading was dropped because the ledger rejected or timed out the write.
    #[serde(rename_all = "camelCase")]
    WriteFailed { cumulative_count: u64, message: String },
    #[serde(rename_all = "camelCase")]
    BaselineWriteFailed { cumulative_count: u64, message: String },
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = CollectorEvent::RowAppended {
            id: 3,
            step_count: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "rowAppended", "id": 3, "stepCount": 12})
        );
    }

    #[test]
    fn collector_starts_stopped() {
        assert_eq!(CollectorStatus::default(), CollectorStatus::Stopped);
    }
}
