use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::server::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(35),
        }
    }
}

/// Sweeps `server` every `settings.interval` until `shutdown` flips to `true`
/// or its sender goes away. A sweep is synchronous, so one that has started
/// always finishes before shutdown is observed.
pub fn spawn_liveness_monitor(
    server: Arc<Server>,
    settings: LivenessSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "liveness monitor - started (interval {:?}, timeout {:?})",
            settings.interval,
            settings.timeout
        );
        let mut ticker = interval_at(Instant::now() + settings.interval, settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = server.sweep(std::time::Instant::now(), settings.timeout);
                    log::debug!(
                        "liveness sweep: {} evicted, {} online",
                        report.evicted.len(),
                        report.live_count
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("liveness monitor - terminated");
    })
}
