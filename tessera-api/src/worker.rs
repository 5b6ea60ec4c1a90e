use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use tessera_order::BookingOrchestrator;

use crate::metrics::Metrics;

/// Periodically fails pending reservations whose hold has lapsed and returns
/// their seats to the ledger.
pub fn start_hold_sweeper(
    booking: Arc<BookingOrchestrator>,
    metrics: Arc<Metrics>,
    every: Duration,
    batch_size: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), batch_size, "Hold expiry sweeper started");
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match booking.expire_stale(Utc::now(), batch_size).await {
                Ok(reclaimed) => metrics.holds_expired.inc_by(reclaimed as u64),
                Err(e) => error!("Hold expiry sweep failed: {}", e),
            }
        }
    })
}
