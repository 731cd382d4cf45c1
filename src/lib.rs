//! Step counter reconciliation and session ledger.
//!
//! Raw cumulative counter readings and location fixes go in through
//! [`CollectorInputs`]; reconciled, append-only step sessions come out in a SQLite
//! ledger ([`Database`]) that survives process restarts and counter resets.

pub mod collector;
pub mod counter;
pub mod db;
pub mod error;
pub mod location;
pub mod settings;
pub mod utils;

pub use collector::{
    CollectorController, CollectorEvent, CollectorInputs, CollectorStatus, SensorCapabilities,
    StaticCapabilities,
};
pub use counter::{
    reconcile, Baseline, BaselineStore, FileBaselineStore, MemoryBaselineStore, RawReading,
    ReconcileOutcome, Reconciliation, ResetPolicy,
};
pub use db::{Database, NewStepSession, StepSession};
pub use error::{CollectorError, CollectorResult};
pub use location::{LocationFix, SpeedEstimator, SpeedSource, SpeedState, SpeedUpdate};
pub use settings::{CollectorSettings, SettingsStore};
pub use utils::logging::init as init_logging;
