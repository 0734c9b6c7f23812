//! Background purge of finished jobs
//!
//! Completed and failed jobs are deleted once their last update is older
//! than `[store] retention_hours`. Pending and processing jobs are never
//! touched.

use chrono::{Duration as ChronoDuration, Utc};
use roomai_common::config::StoreConfig;
use roomai_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::JobStore;

/// Delete terminal jobs last updated more than `retention` ago
pub async fn sweep_once(store: &dyn JobStore, retention: ChronoDuration) -> Result<u64> {
    let cutoff = Utc::now() - retention;
    let purged = store.purge_terminal_before(cutoff).await?;
    if purged > 0 {
        info!(purged, cutoff = %cutoff, "Purged finished jobs");
    } else {
        debug!(cutoff = %cutoff, "No finished jobs to purge");
    }
    Ok(purged)
}

/// Run [`sweep_once`] every `sweep_interval_secs` until the task is aborted
pub fn spawn_retention_sweeper(store: Arc<dyn JobStore>, settings: &StoreConfig) -> JoinHandle<()> {
    let retention = ChronoDuration::hours(settings.retention_hours.max(0));
    let period = Duration::from_secs(settings.sweep_interval_secs.max(1));
    info!(
        retention_hours = settings.retention_hours,
        sweep_interval_secs = period.as_secs(),
        "Retention sweeper started"
    );

    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), retention).await {
                warn!(error = %e, "Retention sweep failed");
            }
        }
    })
}
