use thiserror::Error;

/// Failures surfaced at the collector's control surface.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The ledger could not be opened or created. Fatal to `start`.
    #[error("step ledger unavailable: {0:#}")]
    StorageUnavailable(anyhow::Error),

    /// A single append failed. The reading is dropped; the collector keeps running.
    #[error("failed to append step session: {0:#}")]
    WriteFailure(anyhow::Error),

    #[error("baseline store error: {0:#}")]
    Baseline(anyhow::Error),

    #[error("collector already running")]
    AlreadyRunning,

    #[error("collector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type CollectorResult<T> = Result<T, CollectorError>;
