//! Cache-aside lookups over the movie store and the upstream provider.
//!
//! Reads always go to the store first. Upstream misses and failures degrade to
//! empty results; store failures propagate to the caller.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

use crate::error::StoreError;
use crate::movie::{MovieRecord, MovieView};
use crate::movie_store::MovieStore;
use crate::omdb::MovieProvider;
use crate::stats::LookupStats;

/// Optional narrowing applied to search candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
}

impl SearchFilters {
    /// Applies genre, year and minimum rating in that order. Never reorders.
    pub fn apply(&self, movies: Vec<MovieRecord>) -> Vec<MovieRecord> {
        let mut movies = movies;

        if let Some(genre) = self.genre.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            let needle = genre.to_lowercase();
            movies.retain(|m| {
                m.genres
                    .iter()
                    .any(|g| !g.trim().is_empty() && g.to_lowercase().contains(&needle))
            });
        }

        // Literal comparison, so series years like "2019–2021" never match.
        if let Some(year) = self.year {
            let year = year.to_string();
            movies.retain(|m| m.year == year);
        }

        if let Some(min_rating) = self.min_rating {
            movies.retain(|m| m.parsed_rating().is_some_and(|r| r >= min_rating));
        }

        movies
    }
}

/// Cutoff for the expiry sweep: anything created before it is stale.
///
/// `None` when the window reaches past the earliest representable time, in
/// which case nothing can be stale.
pub fn expiry_cutoff(now: DateTime<Utc>, retention_hours: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_hours(i64::from(retention_hours)).and_then(|window| now.checked_sub_signed(window))
}

#[derive(Clone)]
pub struct MovieLookupService {
    store: Arc<dyn MovieStore>,
    provider: Arc<dyn MovieProvider>,
    retention_hours: u32,
    stats: Arc<LookupStats>,
}

impl MovieLookupService {
    pub fn new(
        store: Arc<dyn MovieStore>,
        provider: Arc<dyn MovieProvider>,
        retention_hours: u32,
    ) -> Self {
        Self {
            store,
            provider,
            retention_hours,
            stats: Arc::new(LookupStats::default()),
        }
    }

    pub fn stats(&self) -> &LookupStats {
        &self.stats
    }

    pub async fn search_movies(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<MovieView>, StoreError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query = query.to_lowercase();

        let cached = self.store.find_by_title_substring(&query).await?;
        let candidates = if cached.is_empty() {
            LookupStats::bump(&self.stats.search_misses);
            tracing::debug!(query = %query, "Search cache MISS");
            self.fetch_and_cache(&query).await?
        } else {
            LookupStats::bump(&self.stats.search_hits);
            tracing::debug!(query = %query, matches = cached.len(), "Search cache HIT");
            cached
        };

        Ok(filters.apply(candidates).iter().map(MovieView::from).collect())
    }

    // Only runs when the title lookup found nothing.
    async fn fetch_and_cache(&self, query: &str) -> Result<Vec<MovieRecord>, StoreError> {
        LookupStats::bump(&self.stats.upstream_calls);
        let ids = match self.provider.resolve_search_ids(query).await {
            Ok(ids) => ids,
            Err(err) => {
                LookupStats::bump(&self.stats.upstream_failures);
                tracing::warn!(query = %query, error = %format!("{err:#}"), "Failed to fetch from OMDb");
                return Ok(Vec::new());
            }
        };

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if id.is_empty() {
                tracing::debug!(query = %query, "Skipping search entry without an id");
                continue;
            }

            // A record may already exist under this id with a different title.
            if let Some(existing) = self.store.find_by_id(&id).await? {
                results.push(existing);
                continue;
            }

            if let Some(mut movie) = self.fetch_details(&id).await {
                // Payloads are not trusted to echo the id that was searched.
                movie.id = id.clone();
                self.store.upsert(&movie).await?;
                results.push(movie);
            }
        }

        Ok(results)
    }

    /// Upstream details; failures read as absent.
    async fn fetch_details(&self, id: &str) -> Option<MovieRecord> {
        LookupStats::bump(&self.stats.upstream_calls);
        match self.provider.fetch_details(id).await {
            Ok(Some(movie)) => Some(movie),
            Ok(None) => {
                tracing::debug!(id, "OMDb returned no details");
                None
            }
            Err(err) => {
                LookupStats::bump(&self.stats.upstream_failures);
                tracing::warn!(id, error = %format!("{err:#}"), "Failed to fetch OMDb details");
                None
            }
        }
    }

    pub async fn get_movie_by_id(&self, id: &str) -> Result<Option<MovieView>, StoreError> {
        if let Some(cached) = self.store.find_by_id(id).await? {
            LookupStats::bump(&self.stats.movie_hits);
            tracing::debug!(id, "Movie cache HIT");
            return Ok(Some(cached.view()));
        }

        LookupStats::bump(&self.stats.movie_misses);
        tracing::debug!(id, "Movie cache MISS");

        let Some(movie) = self.fetch_details(id).await else {
            return Ok(None);
        };

        self.store.upsert(&movie).await?;
        Ok(Some(movie.view()))
    }

    /// Purges every record older than the retention window.
    pub async fn refresh_cache(&self) -> Result<(), StoreError> {
        let Some(cutoff) = expiry_cutoff(Utc::now(), self.retention_hours) else {
            tracing::warn!(
                retention_hours = self.retention_hours,
                "Retention window exceeds the clock range, nothing to purge"
            );
            return Ok(());
        };
        let removed = self.store.delete_older_than(cutoff).await?;

        tracing::info!(
            removed,
            cutoff = %cutoff,
            retention_hours = self.retention_hours,
            "Cache refresh complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movie::test_support::{make_movie, make_movie_at};
    use crate::movie_store::MemoryMovieStore;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        search_results: HashMap<String, Vec<String>>,
        details: HashMap<String, MovieRecord>,
        fail_search: bool,
        fail_details_for: Vec<String>,
        search_calls: AtomicUsize,
        detail_calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn with_details(mut self, movie: MovieRecord) -> Self {
            self.details.insert(movie.id.clone(), movie);
            self
        }

        fn with_search(mut self, query: &str, ids: &[&str]) -> Self {
            self.search_results
                .insert(query.to_string(), ids.iter().map(|s| s.to_string()).collect());
            self
        }

        fn detail_calls(&self) -> Vec<String> {
            self.detail_calls.lock().expect("detail calls lock").clone()
        }
    }

    #[async_trait]
    impl MovieProvider for FakeProvider {
        async fn resolve_search_ids(&self, query: &str) -> Result<Vec<String>> {
            self.search_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_search {
                return Err(anyhow!("connection reset by upstream"));
            }
            Ok(self.search_results.get(query).cloned().unwrap_or_default())
        }

        async fn fetch_details(&self, id: &str) -> Result<Option<MovieRecord>> {
            self.detail_calls
                .lock()
                .expect("detail calls lock")
                .push(id.to_string());
            if self.fail_details_for.iter().any(|f| f == id) {
                return Err(anyhow!("timed out"));
            }
            Ok(self.details.get(id).cloned())
        }
    }

    fn service(
        store: Arc<MemoryMovieStore>,
        provider: Arc<FakeProvider>,
    ) -> MovieLookupService {
        MovieLookupService::new(store, provider, 24)
    }

    fn ids(views: &[MovieView]) -> Vec<&str> {
        views.iter().map(|v| v.imdb_id.as_str()).collect()
    }

    #[tokio::test]
    async fn blank_query_short_circuits() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider = Arc::new(FakeProvider::default());
        let lookup = service(store.clone(), provider.clone());

        assert!(lookup.search_movies("   ", &SearchFilters::default()).await?.is_empty());
        assert!(lookup.search_movies("", &SearchFilters::default()).await?.is_empty());
        assert_eq!(provider.search_calls.load(Ordering::Relaxed), 0);
        assert_eq!(lookup.stats().snapshot().search_misses, 0);
        Ok(())
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store.upsert(&make_movie("tt0372784", "Batman Begins")).await?;
        let provider = Arc::new(FakeProvider::default().with_search("batman", &["tt0096895"]));
        let lookup = service(store.clone(), provider.clone());

        let results = lookup.search_movies("BATMAN", &SearchFilters::default()).await?;

        assert_eq!(ids(&results), vec!["tt0372784"]);
        assert_eq!(provider.search_calls.load(Ordering::Relaxed), 0);
        assert!(provider.detail_calls().is_empty());
        assert_eq!(lookup.stats().snapshot().search_hits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn cache_hit_is_final_even_when_filters_remove_everything() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store.upsert(&make_movie("tt0372784", "Batman Begins")).await?;
        let provider = Arc::new(FakeProvider::default().with_search("batman", &["tt0096895"]));
        let lookup = service(store, provider.clone());

        let filters = SearchFilters {
            genre: Some("comedy".to_string()),
            ..Default::default()
        };
        let results = lookup.search_movies("batman", &filters).await?;

        assert!(results.is_empty());
        assert_eq!(provider.search_calls.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_cache_fetches_and_caches_in_provider_order() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider = Arc::new(
            FakeProvider::default()
                .with_search("batman", &["tt0372784", "tt0096895"])
                .with_details(make_movie("tt0372784", "Batman Begins"))
                .with_details(make_movie("tt0096895", "Batman")),
        );
        let lookup = service(store.clone(), provider.clone());

        let results = lookup.search_movies("Batman", &SearchFilters::default()).await?;

        assert_eq!(ids(&results), vec!["tt0372784", "tt0096895"]);
        assert_eq!(provider.search_calls.load(Ordering::Relaxed), 1);
        assert_eq!(provider.detail_calls(), vec!["tt0372784", "tt0096895"]);
        assert!(store.find_by_id("tt0372784").await?.is_some());
        assert!(store.find_by_id("tt0096895").await?.is_some());
        assert_eq!(store.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn fallback_reuses_records_cached_under_another_title() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store
            .upsert(&make_movie("tt0096895", "The Caped Crusader"))
            .await?;

        let provider = Arc::new(
            FakeProvider::default()
                .with_search("batman", &["tt0096895", "tt0372784"])
                .with_details(make_movie("tt0372784", "Batman Begins")),
        );
        let lookup = service(store.clone(), provider.clone());

        let results = lookup.search_movies("batman", &SearchFilters::default()).await?;

        assert_eq!(ids(&results), vec!["tt0096895", "tt0372784"]);
        assert_eq!(results[0].title, "The Caped Crusader");
        assert_eq!(provider.detail_calls(), vec!["tt0372784"]);
        Ok(())
    }

    #[tokio::test]
    async fn fallback_stamps_requested_id_on_fetched_details() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let payload = make_movie("", "Batman Returns");
        let mut provider = FakeProvider::default().with_search("batman returns", &["tt0103776"]);
        provider.details.insert("tt0103776".to_string(), payload);
        let lookup = service(store.clone(), Arc::new(provider));

        let results = lookup
            .search_movies("batman returns", &SearchFilters::default())
            .await?;

        assert_eq!(ids(&results), vec!["tt0103776"]);
        assert!(store.find_by_id("tt0103776").await?.is_some());
        assert!(store.find_by_id("").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn fallback_skips_ids_without_details_or_with_failed_fetches() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let mut provider = FakeProvider::default()
            .with_search("batman", &["tt1", "", "tt2", "tt3"])
            .with_details(make_movie("tt1", "Batman One"))
            .with_details(make_movie("tt2", "Batman Two"))
            .with_details(make_movie("tt3", "Batman Three"));
        provider.details.remove("tt1");
        provider.fail_details_for = vec!["tt2".to_string()];
        let provider = Arc::new(provider);
        let lookup = service(store.clone(), provider.clone());

        let results = lookup.search_movies("batman", &SearchFilters::default()).await?;

        assert_eq!(ids(&results), vec!["tt3"]);
        assert_eq!(provider.detail_calls(), vec!["tt1", "tt2", "tt3"]);
        assert_eq!(store.len().await, 1);
        assert_eq!(lookup.stats().snapshot().upstream_failures, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_id_resolution_fails_open() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider = Arc::new(FakeProvider {
            fail_search: true,
            ..Default::default()
        });
        let lookup = service(store.clone(), provider.clone());

        let results = lookup.search_movies("batman", &SearchFilters::default()).await?;

        assert!(results.is_empty());
        assert_eq!(provider.search_calls.load(Ordering::Relaxed), 1);
        assert!(provider.detail_calls().is_empty());
        assert_eq!(store.len().await, 0);
        Ok(())
    }

    #[test]
    fn genre_filter_is_case_insensitive_substring() {
        let mut action = make_movie("tt1", "One");
        action.genres = vec!["Action".to_string(), "Drama".to_string()];
        let mut comedy = make_movie("tt2", "Two");
        comedy.genres = vec!["Comedy".to_string()];

        let filters = SearchFilters {
            genre: Some("act".to_string()),
            ..Default::default()
        };
        let kept = filters.apply(vec![action, comedy]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "tt1");
    }

    #[test]
    fn blank_genre_filter_is_ignored() {
        let filters = SearchFilters {
            genre: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(filters.apply(vec![make_movie("tt1", "One")]).len(), 1);
    }

    #[test]
    fn year_filter_is_literal_string_equality() {
        let mut single = make_movie("tt1", "Film");
        single.year = "2019".to_string();
        let mut series = make_movie("tt2", "Series");
        series.year = "2019–2021".to_string();

        let filters = SearchFilters {
            year: Some(2019),
            ..Default::default()
        };
        let kept = filters.apply(vec![single, series]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "tt1");
    }

    #[test]
    fn min_rating_drops_unparseable_ratings() {
        let movies: Vec<_> = [("tt1", "8.1"), ("tt2", "N/A"), ("tt3", "7.4")]
            .into_iter()
            .map(|(id, raw)| {
                let mut movie = make_movie(id, id);
                movie.rating_raw = raw.to_string();
                movie
            })
            .collect();

        let filters = SearchFilters {
            min_rating: Some(7.5),
            ..Default::default()
        };
        let kept = filters.apply(movies);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rating_raw, "8.1");
    }

    #[test]
    fn filters_preserve_candidate_order() {
        let movies = vec![
            make_movie("tt3", "C"),
            make_movie("tt1", "A"),
            make_movie("tt2", "B"),
        ];
        let filters = SearchFilters {
            genre: Some("drama".to_string()),
            year: Some(2005),
            min_rating: Some(8.0),
        };
        let kept: Vec<_> = filters.apply(movies).into_iter().map(|m| m.id).collect();
        assert_eq!(kept, vec!["tt3", "tt1", "tt2"]);
    }

    #[tokio::test]
    async fn get_by_id_prefers_cache() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store.upsert(&make_movie("tt0372784", "Batman Begins")).await?;
        let provider = Arc::new(FakeProvider::default());
        let lookup = service(store, provider.clone());

        let movie = lookup.get_movie_by_id("tt0372784").await?;

        assert_eq!(movie.map(|m| m.title), Some("Batman Begins".to_string()));
        assert!(provider.detail_calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn get_by_id_fetches_and_caches_on_miss() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider =
            Arc::new(FakeProvider::default().with_details(make_movie("tt0096895", "Batman")));
        let lookup = service(store.clone(), provider.clone());

        let movie = lookup.get_movie_by_id("tt0096895").await?;
        assert_eq!(movie.map(|m| m.imdb_id), Some("tt0096895".to_string()));
        assert!(store.find_by_id("tt0096895").await?.is_some());

        lookup.get_movie_by_id("tt0096895").await?;
        assert_eq!(provider.detail_calls().len(), 1, "second lookup is a cache hit");
        Ok(())
    }

    #[tokio::test]
    async fn get_by_id_does_not_cache_negative_results() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider = Arc::new(FakeProvider::default());
        let lookup = service(store.clone(), provider);

        assert!(lookup.get_movie_by_id("tt9999999").await?.is_none());
        assert_eq!(store.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn get_by_id_upstream_failure_reads_as_not_found() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let provider = Arc::new(FakeProvider {
            fail_details_for: vec!["tt0372784".to_string()],
            ..Default::default()
        });
        let lookup = service(store.clone(), provider);

        assert!(lookup.get_movie_by_id("tt0372784").await?.is_none());
        assert_eq!(store.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_cache_purges_by_creation_time() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let now = Utc::now();
        let mut stale = make_movie_at("stale", "Stale", now - TimeDelta::hours(25));
        // Recently refreshed, but the expiry clock is the original insert.
        stale.cached_at = now;
        store.upsert(&stale).await?;
        store
            .upsert(&make_movie_at("fresh", "Fresh", now - TimeDelta::hours(23)))
            .await?;
        let lookup = service(store.clone(), Arc::new(FakeProvider::default()));

        lookup.refresh_cache().await?;

        assert!(store.find_by_id("stale").await?.is_none());
        assert!(store.find_by_id("fresh").await?.is_some());
        Ok(())
    }

    #[test]
    fn expiry_cutoff_subtracts_retention_hours() {
        let now = Utc::now();
        assert_eq!(expiry_cutoff(now, 24), Some(now - TimeDelta::hours(24)));
        assert_eq!(expiry_cutoff(now, 0), Some(now));
        assert_eq!(expiry_cutoff(now, u32::MAX), None, "window past the clock range");
    }

    #[tokio::test]
    async fn refresh_cache_with_oversized_window_keeps_everything() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store
            .upsert(&make_movie_at("old", "Old", Utc::now() - TimeDelta::hours(10_000)))
            .await?;
        let lookup = MovieLookupService::new(store.clone(), Arc::new(FakeProvider::default()), u32::MAX);

        lookup.refresh_cache().await?;

        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn zero_hour_window_keeps_records_created_after_the_sweep_starts() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        store
            .upsert(&make_movie_at("future", "Future", Utc::now() + TimeDelta::hours(1)))
            .await?;
        let lookup = MovieLookupService::new(store.clone(), Arc::new(FakeProvider::default()), 0);

        lookup.refresh_cache().await?;

        assert!(store.find_by_id("future").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn get_by_id_keeps_the_payload_id() -> Result<()> {
        let store = Arc::new(MemoryMovieStore::new());
        let mut provider = FakeProvider::default();
        provider.details.insert(
            "TT0372784".to_string(),
            make_movie("tt0372784", "Batman Begins"),
        );
        let lookup = service(store.clone(), Arc::new(provider));

        let movie = lookup.get_movie_by_id("TT0372784").await?;

        assert_eq!(movie.map(|m| m.imdb_id), Some("tt0372784".to_string()));
        assert!(store.find_by_id("tt0372784").await?.is_some());
        assert!(store.find_by_id("TT0372784").await?.is_none());
        Ok(())
    }
}
