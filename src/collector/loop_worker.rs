use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::{counter::RawReading, location::LocationFix};

use super::processor::Collector;

const ENABLE_LOGS: bool = true;

/// Fixes handled back to back before a queued reading gets a turn.
const MAX_FIXES_PER_READING: usize = 32;

use crate::{log_error, log_info};

/// Consumes readings and fixes until cancelled or until the reading stream closes.
///
/// Queued fixes are served ahead of readings so rows carry the freshest location, but
/// never more than `MAX_FIXES_PER_READING` in a row while a reading is waiting.
///
/// Cancellation is a soft drain: the input in flight completes, anything already
/// queued is processed, and the baseline is flushed before the task returns.
pub async fn collector_loop(
    mut collector: Collector,
    mut readings: mpsc::Receiver<RawReading>,
    mut fixes: mpsc::Receiver<LocationFix>,
    cancel_token: CancellationToken,
) -> Collector {
    let mut fix_streak = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("collector loop draining");
                break;
            }
            Some(fix) = fixes.recv() => {
                collector.handle_fix(fix);
                fix_streak += 1;
                if fix_streak >= MAX_FIXES_PER_READING {
                    fix_streak = 0;
                    match readings.try_recv() {
                        Ok(raw) => process_reading(&mut collector, raw).await,
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => {
                            log_info!("reading stream closed; collector loop exiting");
                            break;
                        }
                    }
                }
            }
            reading = readings.recv() => match reading {
                Some(raw) => {
                    fix_streak = 0;
                    process_reading(&mut collector, raw).await;
                }
                None => {
                    log_info!("reading stream closed; collector loop exiting");
                    break;
                }
            }
        }
    }

    readings.close();
    fixes.close();
    while let Ok(fix) = fixes.try_recv() {
        collector.handle_fix(fix);
    }
    while let Ok(raw) = readings.try_recv() {
        process_reading(&mut collector, raw).await;
    }

    if let Err(err) = collector.flush_baseline() {
        log_error!("failed to flush baseline on shutdown: {err}");
    }

    log_info!("collector loop shutting down");
    collector
}

async fn process_reading(collector: &mut Collector, raw: RawReading) {
    // Failures were already logged and broadcast by the collector; the loop keeps going.
    let _ = collector.handle_reading(raw).await;
}
