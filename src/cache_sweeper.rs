use crate::lookup::MovieLookupService;
use std::time::Duration;

/// Periodically purge expired movies. A zero interval leaves the sweep to the
/// refresh endpoint alone.
pub fn start_cache_sweep_task(lookup: MovieLookupService, every: Duration) {
    if every.is_zero() {
        tracing::info!("Scheduled cache sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            interval.tick().await;
            if let Err(err) = lookup.refresh_cache().await {
                tracing::error!(error = %err, "Scheduled cache sweep failed");
            }
        }
    });
}

/// Periodically log lookup hit rates.
pub fn start_stats_task(lookup: MovieLookupService, every: Duration) {
    if every.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            interval.tick().await;
            lookup.stats().log_stats();
        }
    });
}
