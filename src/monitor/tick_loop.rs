use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channels::Channel;
use crate::store::SampleStoreHandle;

use super::controller::PostureMonitor;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Drive [`PostureMonitor::tick`] on a fixed period until cancelled.
pub async fn run_tick_loop(
    monitor: Arc<Mutex<PostureMonitor>>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            tick = ticker.tick() => {
                let report = monitor.lock().await.tick(tick.into_std());
                if report.is_empty() {
                    continue;
                }
                if let Some(latest) = report.classified.last() {
                    log_debug!(
                        "{} records this tick, latest {} at {}",
                        report.classified.len(),
                        latest.status,
                        latest.pressure_label()
                    );
                }
                for err in &report.errors {
                    if err.is_recoverable() {
                        log_warn!("pipeline: {err}");
                    } else {
                        log_error!("pipeline: {err}");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("tick loop shutting down");
                break;
            }
        }
    }
}

/// Periodic reader of the sample windows, standing in for a chart surface.
///
/// Runs at its own rate, independent of how fast records arrive.
pub async fn run_render_loop(
    store: SampleStoreHandle,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = store.snapshot_all();
                if snapshot.ticks == 0 {
                    continue;
                }
                let latest: Vec<String> = Channel::ALL
                    .iter()
                    .filter_map(|channel| {
                        snapshot
                            .channel(*channel)
                            .last()
                            .map(|(_, value)| format!("{channel}={value:.0}"))
                    })
                    .collect();
                log_debug!(
                    "window [{}..{}) {}",
                    snapshot.origin,
                    snapshot.ticks,
                    latest.join(" ")
                );
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
