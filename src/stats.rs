use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for monitoring how often lookups are served from the cache.
#[derive(Debug, Default)]
pub struct LookupStats {
    pub(crate) search_hits: AtomicU64,
    pub(crate) search_misses: AtomicU64,
    pub(crate) movie_hits: AtomicU64,
    pub(crate) movie_misses: AtomicU64,
    pub(crate) upstream_calls: AtomicU64,
    pub(crate) upstream_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub search_hits: u64,
    pub search_misses: u64,
    pub movie_hits: u64,
    pub movie_misses: u64,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
}

impl LookupStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            search_hits: self.search_hits.load(Ordering::Relaxed),
            search_misses: self.search_misses.load(Ordering::Relaxed),
            movie_hits: self.movie_hits.load(Ordering::Relaxed),
            movie_misses: self.movie_misses.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let s = self.snapshot();

        let search_total = s.search_hits + s.search_misses;
        if search_total > 0 {
            tracing::info!(
                hit_rate = %format!("{:.1}%", hit_rate(s.search_hits, search_total)),
                hits = s.search_hits,
                total = search_total,
                "Cache stats - search"
            );
        }

        let movie_total = s.movie_hits + s.movie_misses;
        if movie_total > 0 {
            tracing::info!(
                hit_rate = %format!("{:.1}%", hit_rate(s.movie_hits, movie_total)),
                hits = s.movie_hits,
                total = movie_total,
                "Cache stats - movie"
            );
        }

        tracing::info!(
            calls = s.upstream_calls,
            failures = s.upstream_failures,
            "Total OMDb API calls"
        );
    }
}

fn hit_rate(hits: u64, total: u64) -> f64 {
    (hits as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_bumped_counters() {
        let stats = LookupStats::default();
        LookupStats::bump(&stats.search_hits);
        LookupStats::bump(&stats.search_hits);
        LookupStats::bump(&stats.upstream_calls);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.search_hits, 2);
        assert_eq!(snapshot.search_misses, 0);
        assert_eq!(snapshot.upstream_calls, 1);
    }

    #[test]
    fn hit_rate_is_a_percentage() {
        assert_eq!(hit_rate(1, 4), 25.0);
        assert_eq!(hit_rate(3, 3), 100.0);
    }
}
