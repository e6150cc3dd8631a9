use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{
    sync::RwLock,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{Cycle, CycleReport, ReconcileError, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastCycle {
    /// Unix seconds.
    pub finished_at: i64,
    pub report: Option<CycleReport>,
    pub error: Option<String>,
}

/// Outcome of the most recent run of each reconciler.
#[derive(Debug, Clone, Default)]
pub struct Status(Arc<RwLock<BTreeMap<Cycle, LastCycle>>>);

impl Status {
    pub async fn record(&self, cycle: Cycle, result: &Result<CycleReport, ReconcileError>) {
        let last = LastCycle {
            finished_at: OffsetDateTime::now_utc().unix_timestamp(),
            report: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.0.write().await.insert(cycle, last);
    }

    pub async fn snapshot(&self) -> BTreeMap<Cycle, LastCycle> {
        self.0.read().await.clone()
    }
}

impl Reconciler {
    /// Runs `cycle` on a fixed interval, one run at a time. A failed run is
    /// logged and retried on the next tick.
    pub async fn run_every(self: Arc<Self>, cycle: Cycle, period: Duration, status: Status) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(%cycle, period_secs = period.as_secs(), "reconciler started");

        loop {
            ticker.tick().await;

            let result = self.run_cycle(cycle).await;
            match &result {
                Ok(report) if report.is_idle() => debug!(%cycle, "nothing to do"),
                Ok(report) => info!(
                    %cycle,
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "cycle finished"
                ),
                Err(e) => warn!(%cycle, error = %e, "cycle failed"),
            }
            status.record(cycle, &result).await;
        }
    }
}
