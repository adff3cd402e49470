use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::movie::MovieRecord;

/// Persistence contract for cached movies, keyed by provider id.
#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<MovieRecord>, StoreError>;

    /// Case-insensitive substring match on the title, stable order.
    async fn find_by_title_substring(&self, text: &str) -> Result<Vec<MovieRecord>, StoreError>;

    /// Insert or fully replace by id, keeping the stored `created_at` on replace.
    async fn upsert(&self, movie: &MovieRecord) -> Result<(), StoreError>;

    /// Removes every record created strictly before `cutoff`, returning how many went.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

const MOVIE_COLUMNS: &str = "id, title, year, genres, director, actors, rating_numeric, \
     rating_raw, runtime_minutes, plot, cached_at, created_at";

#[derive(Debug, Clone)]
pub struct PgMovieStore {
    pool: PgPool,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<MovieRecord>, StoreError> {
        let movie = sqlx::query_as::<_, MovieRecord>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movie)
    }

    async fn find_by_title_substring(&self, text: &str) -> Result<Vec<MovieRecord>, StoreError> {
        let pattern = format!("%{}%", escape_like(text));
        let movies = sqlx::query_as::<_, MovieRecord>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE title ILIKE $1 ORDER BY created_at, id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn upsert(&self, movie: &MovieRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO movies (id, title, year, genres, director, actors, rating_numeric,
                                rating_raw, runtime_minutes, plot, cached_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                year = EXCLUDED.year,
                genres = EXCLUDED.genres,
                director = EXCLUDED.director,
                actors = EXCLUDED.actors,
                rating_numeric = EXCLUDED.rating_numeric,
                rating_raw = EXCLUDED.rating_raw,
                runtime_minutes = EXCLUDED.runtime_minutes,
                plot = EXCLUDED.plot,
                cached_at = EXCLUDED.cached_at
            "#,
        )
        .bind(&movie.id)
        .bind(&movie.title)
        .bind(&movie.year)
        .bind(&movie.genres)
        .bind(&movie.director)
        .bind(&movie.actors)
        .bind(movie.rating_numeric)
        .bind(&movie.rating_raw)
        .bind(movie.runtime_minutes)
        .bind(&movie.plot)
        .bind(movie.cached_at)
        .bind(movie.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Escapes LIKE wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// In-process store with the same contract, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryMovieStore {
    movies: RwLock<Vec<MovieRecord>>,
}

impl MemoryMovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.movies.read().await.len()
    }
}

#[async_trait]
impl MovieStore for MemoryMovieStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<MovieRecord>, StoreError> {
        let movies = self.movies.read().await;
        Ok(movies.iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_title_substring(&self, text: &str) -> Result<Vec<MovieRecord>, StoreError> {
        let needle = text.to_lowercase();
        let movies = self.movies.read().await;
        Ok(movies
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn upsert(&self, movie: &MovieRecord) -> Result<(), StoreError> {
        let mut movies = self.movies.write().await;
        match movies.iter_mut().find(|m| m.id == movie.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = movie.clone();
                existing.created_at = created_at;
            }
            None => movies.push(movie.clone()),
        }
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut movies = self.movies.write().await;
        let before = movies.len();
        movies.retain(|m| m.created_at >= cutoff);
        Ok((before - movies.len()) as u64)
    }
}
