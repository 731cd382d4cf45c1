use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{
    counter::{reconcile, Baseline, BaselineStore, RawReading, ReconcileOutcome, ResetPolicy},
    db::{Database, NewStepSession, StepSession},
    error::{CollectorError, CollectorResult},
    location::{LocationFix, SpeedEstimator, SpeedSource},
};

use super::state::CollectorEvent;

// Set to true to enable verbose per-reading logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Per-process collector state: the baseline, the last location fix and the ledger
/// handle, advanced one input at a time.
pub struct Collector {
    db: Database,
    baseline_store: Arc<dyn BaselineStore>,
    baseline: Option<Baseline>,
    baseline_dirty: bool,
    speed: SpeedEstimator,
    start_date: DateTime<Utc>,
    reset_policy: ResetPolicy,
    write_timeout: Duration,
    events: broadcast::Sender<CollectorEvent>,
    reported_missing_fix: bool,
}

impl Collector {
    pub fn new(
        db: Database,
        baseline_store: Arc<dyn BaselineStore>,
        start_date: DateTime<Utc>,
        reset_policy: ResetPolicy,
        write_timeout: Duration,
        events: broadcast::Sender<CollectorEvent>,
    ) -> CollectorResult<Self> {
        let baseline = baseline_store.load().map_err(CollectorError::Baseline)?;
        match baseline {
            Some(b) => log_info!(
                "Resuming from baseline {} ({:?})",
                b.last_cumulative_count,
                reset_policy
            ),
            None => log_info!("No baseline yet; first reading will establish it"),
        }

        Ok(Self {
            db,
            baseline_store,
            baseline,
            baseline_dirty: false,
            speed: SpeedEstimator::new(),
            start_date,
            reset_policy,
            write_timeout,
            events,
            reported_missing_fix: false,
        })
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn handle_fix(&mut self, fix: LocationFix) {
        let update = self.speed.update(fix);
        if update.source == SpeedSource::HeldZeroDuration {
            log_debug!(
                "Fix at {} has no elapsed time since the last one; keeping speed {:.2} m/s",
                fix.time,
                update.state.speed
            );
        }
    }

    /// Reconciles one reading and appends the resulting row.
    ///
    /// Returns `Ok(None)` when the reading only established the baseline. On
    /// `Err(WriteFailure)` the reading is dropped and no row was written, but the baseline
    /// has still moved to `raw.cumulative_count`.
    pub async fn handle_reading(&mut self, raw: RawReading) -> CollectorResult<Option<StepSession>> {
        let prior_total = if self.baseline.is_some() {
            match self.bounded_last_step_count().await {
                Ok(total) => total,
                Err(err) => {
                    self.advance_baseline(Baseline::new(raw.cumulative_count));
                    return Err(self.report_write_failure(&raw, err));
                }
            }
        } else {
            0
        };

        let previous = self.baseline;
        let reconciled = reconcile(&raw, previous, prior_total, self.reset_policy);

        match reconciled.outcome {
            ReconcileOutcome::BaselineEstablished => {
                log_info!("Baseline established at {}", raw.cumulative_count);
                self.emit(CollectorEvent::BaselineEstablished {
                    cumulative_count: raw.cumulative_count,
                });
                self.advance_baseline(reconciled.baseline);
                return Ok(None);
            }
            ReconcileOutcome::CounterReset { credited } => {
                let previous = previous.map(|b| b.last_cumulative_count).unwrap_or_default();
                log_warn!(
                    "Counter reset detected ({} -> {}); crediting {} step(s)",
                    previous,
                    raw.cumulative_count,
                    credited
                );
                self.emit(CollectorEvent::CounterReset {
                    previous,
                    current: raw.cumulative_count,
                    credited,
                });
            }
            ReconcileOutcome::Advanced { delta } => {
                log_debug!("Counter advanced by {}", delta);
            }
        }

        if self.speed.current().is_none() && !self.reported_missing_fix {
            log_info!("No location fix yet; recording rows without location");
            self.reported_missing_fix = true;
        }

        let row = NewStepSession::new(self.start_date, raw.timestamp, reconciled.total)
            .with_location(self.speed.current());

        let appended = self.bounded_append(&row).await;
        self.advance_baseline(reconciled.baseline);

        match appended {
            Ok(stored) => {
                log_debug!("Appended row {} with total {}", stored.id, stored.step_count);
                self.emit(CollectorEvent::RowAppended {
                    id: stored.id,
                    step_count: stored.step_count,
                });
                Ok(Some(stored))
            }
            Err(err) => Err(self.report_write_failure(&raw, err)),
        }
    }

    /// Retries a baseline write that failed earlier. Called once the loop has drained.
    pub fn flush_baseline(&mut self) -> CollectorResult<()> {
        if !self.baseline_dirty {
            return Ok(());
        }
        let Some(baseline) = self.baseline else {
            return Ok(());
        };

        self.baseline_store
            .store(baseline)
            .map_err(CollectorError::Baseline)?;
        self.baseline_dirty = false;
        log_info!("Flushed baseline {}", baseline.last_cumulative_count);
        Ok(())
    }

    fn advance_baseline(&mut self, baseline: Baseline) {
        self.baseline = Some(baseline);
        match self.baseline_store.store(baseline) {
            Ok(()) => self.baseline_dirty = false,
            Err(err) => {
                self.baseline_dirty = true;
                log_error!(
                    "Failed to persist baseline {}: {err:#}",
                    baseline.last_cumulative_count
                );
                self.emit(CollectorEvent::BaselineWriteFailed {
                    cumulative_count: baseline.last_cumulative_count,
                    message: format!("{err:#}"),
                });
            }
        }
    }

    async fn bounded_last_step_count(&self) -> anyhow::Result<u64> {
        tokio::time::timeout(self.write_timeout, self.db.last_step_count())
            .await
            .map_err(|_| {
                anyhow!(
                    "ledger query timed out after {}ms",
                    self.write_timeout.as_millis()
                )
            })?
    }

    /// The deadline is enforced on the ledger thread, so a failed append never commits later.
    async fn bounded_append(&self, row: &NewStepSession) -> anyhow::Result<StepSession> {
        let deadline = Instant::now() + self.write_timeout;
        self.db
            .append_step_session_before(row, deadline)
            .await
            .with_context(|| {
                format!(
                    "ledger append not committed within {}ms",
                    self.write_timeout.as_millis()
                )
            })
    }

    fn report_write_failure(&self, raw: &RawReading, err: anyhow::Error) -> CollectorError {
        log_error!(
            "Dropping reading {} at {}: {err:#}",
            raw.cumulative_count,
            raw.timestamp
        );
        self.emit(CollectorEvent::WriteFailed {
            cumulative_count: raw.cumulative_count,
            message: format!("{err:#}"),
        });
        CollectorError::WriteFailure(err)
    }

    fn emit(&self, event: CollectorEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
