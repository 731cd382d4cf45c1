use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    counter::{BaselineStore, FileBaselineStore, RawReading},
    db::Database,
    error::{CollectorError, CollectorResult},
    location::LocationFix,
    settings::CollectorSettings,
};

use super::{
    loop_worker::collector_loop,
    processor::Collector,
    state::{CollectorEvent, CollectorStatus},
};

const EVENT_CAPACITY: usize = 64;

/// Device capability probe supplied by the host.
pub trait SensorCapabilities: Send + Sync {
    fn has_step_counter(&self) -> bool;
    fn has_step_detector(&self) -> bool;
}

/// Fixed capability answer, for hosts that probe once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticCapabilities {
    pub step_counter: bool,
    pub step_detector: bool,
}

impl SensorCapabilities for StaticCapabilities {
    fn has_step_counter(&self) -> bool {
        self.step_counter
    }

    fn has_step_detector(&self) -> bool {
        self.step_detector
    }
}

/// Senders handed to the host's sensor and location subscriptions.
#[derive(Debug, Clone)]
pub struct CollectorInputs {
    pub readings: mpsc::Sender<RawReading>,
    pub fixes: mpsc::Sender<LocationFix>,
}

struct RunningCollector {
    handle: JoinHandle<Collector>,
    cancel_token: CancellationToken,
    db: Database,
    start_date: DateTime<Utc>,
}

/// Start/stop control surface for the background collector.
pub struct CollectorController {
    capabilities: Arc<dyn SensorCapabilities>,
    baseline_store: Option<Arc<dyn BaselineStore>>,
    events: broadcast::Sender<CollectorEvent>,
    running: Option<RunningCollector>,
}

impl CollectorController {
    pub fn new(capabilities: Arc<dyn SensorCapabilities>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            capabilities,
            baseline_store: None,
            events,
            running: None,
        }
    }

    /// Uses `store` instead of the file named by `CollectorSettings::baseline_path`.
    pub fn with_baseline_store(mut self, store: Arc<dyn BaselineStore>) -> Self {
        self.baseline_store = Some(store);
        self
    }

    pub fn can_count_steps(&self) -> bool {
        self.capabilities.has_step_counter() && self.capabilities.has_step_detector()
    }

    pub fn status(&self) -> CollectorStatus {
        if self.running.is_some() {
            CollectorStatus::Running
        } else {
            CollectorStatus::Stopped
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectorEvent> {
        self.events.subscribe()
    }

    /// Ledger handle for readers while the collector is running.
    pub fn ledger(&self) -> Option<Database> {
        self.running.as_ref().map(|running| running.db.clone())
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.running.as_ref().map(|running| running.start_date)
    }

    pub async fn start(&mut self, settings: &CollectorSettings) -> CollectorResult<CollectorInputs> {
        if self.running.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }

        let start_date = Utc::now();

        let ledger_path = settings.ledger_path.clone();
        let open_timeout = settings.open_timeout();
        let busy_timeout = settings.busy_timeout();
        let db = tokio::task::spawn_blocking(move || {
            Database::open(ledger_path, open_timeout, busy_timeout)
        })
        .await?
        .map_err(CollectorError::StorageUnavailable)?;

        let baseline_store: Arc<dyn BaselineStore> = match &self.baseline_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(
                FileBaselineStore::new(settings.baseline_path.clone())
                    .map_err(CollectorError::Baseline)?,
            ),
        };

        let collector = Collector::new(
            db.clone(),
            baseline_store,
            start_date,
            settings.reset_policy,
            settings.write_timeout(),
            self.events.clone(),
        )?;

        let capacity = settings.channel_capacity();
        let (readings_tx, readings_rx) = mpsc::channel(capacity);
        let (fixes_tx, fixes_rx) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();

        let _ = self.events.send(CollectorEvent::Started { start_date });
        let handle = tokio::spawn(collector_loop(
            collector,
            readings_rx,
            fixes_rx,
            cancel_token.clone(),
        ));

        self.running = Some(RunningCollector {
            handle,
            cancel_token,
            db,
            start_date,
        });

        info!("Step collector started at {start_date}");

        Ok(CollectorInputs {
            readings: readings_tx,
            fixes: fixes_tx,
        })
    }

    /// Drains queued readings and waits for the loop to exit. No-op when stopped.
    pub async fn stop(&mut self) -> CollectorResult<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel_token.cancel();
        let (collector, joined) = match running.handle.await {
            Ok(collector) => (Some(collector), Ok(())),
            Err(err) => (None, Err(CollectorError::from(err))),
        };

        // Releasing the last ledger handle joins its worker thread.
        let db = running.db;
        tokio::task::spawn_blocking(move || {
            drop(collector);
            drop(db);
        })
        .await?;

        info!("Step collector stopped");
        let _ = self.events.send(CollectorEvent::Stopped);

        joined
    }
}

impl Drop for CollectorController {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            warn!("Collector controller dropped while running; cancelling loop");
            running.cancel_token.cancel();
        }
    }
}
