use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use models::{NewStepSession, StepSession};

use migrations::run_migrations;

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to ledger thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join ledger thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the step ledger.
///
/// The SQLite connection lives on a dedicated worker thread and every statement is
/// shipped to it as a closure, so the ledger has exactly one writer no matter how
/// many clones of the handle exist. Readers going through the same handle are
/// serialized behind in-flight appends and never observe a partial row.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        Self::open(db_path, DEFAULT_OPEN_TIMEOUT, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens (creating if needed) the ledger at `db_path` and brings the schema up to date.
    ///
    /// Fails if the worker has not reported readiness within `open_timeout`.
    pub fn open(db_path: PathBuf, open_timeout: Duration, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create ledger directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("stepledger-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite ledger")));
                        return;
                    }
                };

                if let Err(err) = conn.busy_timeout(busy_timeout) {
                    error!("Failed to set busy timeout: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run ledger migrations");
                let init_failed = init_result.is_err();
                if ready_tx.send(init_result).is_err() {
                    error!("Ledger initialization receiver dropped before ready signal");
                    return;
                }
                if init_failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Ledger thread shutting down");
            })
            .with_context(|| "failed to spawn ledger worker thread")?;

        let ready = match ready_rx.recv_timeout(open_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The worker is stuck on a locked file; let it finish on its own.
                drop(command_tx);
                return Err(anyhow!(
                    "ledger at {} did not open within {}ms",
                    db_path.display(),
                    open_timeout.as_millis()
                ));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(anyhow!("ledger worker exited before signaling readiness"))
            }
        };

        if let Err(err) = ready {
            let _ = worker.join();
            return Err(err);
        }

        info!("Step ledger initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `task` on the ledger thread. A task whose caller stopped waiting before it
    /// was picked up is skipped.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.is_closed() {
                warn!("Skipping ledger task abandoned by its caller");
                return;
            }
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Ledger caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to ledger thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("ledger thread terminated unexpectedly"))?
    }
}
