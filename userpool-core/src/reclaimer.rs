//! Background recovery of leases whose holders never released them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::infrastructure::IdentityStore;
use crate::ledger::Ledger;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired leases found by the scan
    pub scanned: usize,
    pub reclaimed: usize,
    /// Released or re-locked concurrently, left alone
    pub skipped: usize,
    /// Store errors; retried next sweep
    pub failed: usize,
}

#[derive(Clone)]
pub struct Reclaimer {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    lease_timeout_ms: u64,
}

impl Reclaimer {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, lease_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            lease_timeout_ms: lease_timeout.as_millis() as u64,
        }
    }

    /// Force-release every lease older than the timeout.
    ///
    /// Each identity goes through the same compare-and-set as a normal
    /// release, against the exact locked state the scan observed. One failing
    /// row never stops the rest of the sweep.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock.now_ms();
        let cutoff = Ledger::reclaim_cutoff(now, self.lease_timeout_ms);

        let expired = match self.store.list_locked_before(cutoff) {
            Ok(expired) => expired,
            Err(e) => {
                error!(error = %e, "Reclaim scan failed, retrying next sweep");
                report.failed += 1;
                return report;
            }
        };

        for identity in expired {
            report.scanned += 1;

            let next = match Ledger::reclaim(&identity.lock_state, now, self.lease_timeout_ms) {
                Ok(next) => next,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };

            match self
                .store
                .compare_and_set_state(&identity.id, &identity.lock_state, &next, now)
            {
                Ok(true) => {
                    report.reclaimed += 1;
                    warn!(
                        identity_id = %identity.id,
                        login = %identity.login,
                        holder = identity.lock_state.holder().unwrap_or_default(),
                        held_ms = now.saturating_sub(identity.lock_state.locked_at().unwrap_or(now)),
                        "Reclaimed abandoned lease"
                    );
                }
                Ok(false) => {
                    report.skipped += 1;
                    debug!(identity_id = %identity.id, "Lease changed during reclaim, skipping");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        identity_id = %identity.id,
                        error = %e,
                        "Failed to reclaim lease, retrying next sweep"
                    );
                }
            }
        }

        report
    }

    /// Run `sweep` every `period` on the tokio runtime.
    ///
    /// Sweeps touch the store synchronously, so each one runs on the blocking
    /// pool. Must be called from within a runtime.
    pub fn spawn(self, period: Duration) -> ReclaimerHandle {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_ms = period.as_millis() as u64,
                lease_timeout_ms = self.lease_timeout_ms,
                "Reclaimer started"
            );

            loop {
                timer.tick().await;

                let reclaimer = self.clone();
                match tokio::task::spawn_blocking(move || reclaimer.sweep()).await {
                    Ok(report) if report.reclaimed > 0 || report.failed > 0 => {
                        info!(
                            scanned = report.scanned,
                            reclaimed = report.reclaimed,
                            failed = report.failed,
                            "Reclaim sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Reclaim sweep aborted"),
                }
            }
        });

        ReclaimerHandle { handle }
    }
}

/// Stops the periodic reclaimer when shut down or dropped.
pub struct ReclaimerHandle {
    handle: JoinHandle<()>,
}

impl ReclaimerHandle {
    pub fn shutdown(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ReclaimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
