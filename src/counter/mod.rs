pub mod baseline;
pub mod reconciler;

pub use baseline::{Baseline, BaselineStore, FileBaselineStore, MemoryBaselineStore};
pub use reconciler::{reconcile, RawReading, Reconciliation, ReconcileOutcome, ResetPolicy};
