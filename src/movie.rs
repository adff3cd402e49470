use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical cached representation of one upstream title.
///
/// `created_at` is the expiry clock and is only ever written on first insert;
/// `cached_at` tracks the last refresh from upstream.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MovieRecord {
    pub id: String,
    pub title: String,
    // Kept in the provider's format, series come back as ranges ("2019–2021").
    pub year: String,
    pub genres: Vec<String>,
    pub director: String,
    pub actors: Vec<String>,
    pub rating_numeric: f64,
    pub rating_raw: String,
    pub runtime_minutes: i32,
    pub plot: String,
    pub cached_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MovieRecord {
    /// Rating as a float, only when the raw upstream value parses.
    pub fn parsed_rating(&self) -> Option<f64> {
        self.rating_raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
    }

    pub fn view(&self) -> MovieView {
        MovieView::from(self)
    }
}

/// Read-only projection handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieView {
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    pub title: String,
    pub year: String,
    pub genre: Vec<String>,
    pub director: String,
    pub actors: Vec<String>,
    pub rating: f64,
    pub imdb_rating: String,
    pub runtime: i32,
    pub plot: String,
}

impl From<&MovieRecord> for MovieView {
    fn from(record: &MovieRecord) -> Self {
        Self {
            imdb_id: record.id.clone(),
            title: record.title.clone(),
            year: record.year.clone(),
            genre: record.genres.clone(),
            director: record.director.clone(),
            actors: record.actors.clone(),
            rating: record.rating_numeric,
            imdb_rating: record.rating_raw.clone(),
            runtime: record.runtime_minutes,
            plot: record.plot.clone(),
        }
    }
}
