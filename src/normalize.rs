//! Defensive field extraction for upstream payloads.
//!
//! Every helper degrades to a zero value instead of failing, so a partial or
//! oddly shaped payload still yields a record.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::movie::MovieRecord;

/// True when the payload's `Response` flag is affirmative.
pub fn is_affirmative(root: &Value) -> bool {
    root.get("Response")
        .and_then(Value::as_str)
        .map(|flag| flag.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// String field, or empty when missing or not a string.
pub fn string_field(root: &Value, name: &str) -> String {
    root.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Splits a comma-delimited field, trimming entries and dropping empty ones.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_rating(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|rating| rating.is_finite())
        .unwrap_or(0.0)
}

/// Parses values like `"142 min"`; anything else is 0.
pub fn parse_runtime(raw: &str) -> i32 {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("min").unwrap_or(trimmed).trim();
    number.parse::<i32>().unwrap_or(0)
}

/// Builds a record from an affirmative details payload.
///
/// `created_at` starts equal to `fetched_at`; stores keep the original value
/// when the id already exists.
pub fn movie_from_details(root: &Value, fetched_at: DateTime<Utc>) -> MovieRecord {
    let rating_raw = string_field(root, "imdbRating");

    MovieRecord {
        id: string_field(root, "imdbID"),
        title: string_field(root, "Title"),
        year: string_field(root, "Year"),
        genres: split_list(&string_field(root, "Genre")),
        director: string_field(root, "Director"),
        actors: split_list(&string_field(root, "Actors")),
        rating_numeric: parse_rating(&rating_raw),
        rating_raw,
        runtime_minutes: parse_runtime(&string_field(root, "Runtime")),
        plot: string_field(root, "Plot"),
        cached_at: fetched_at,
        created_at: fetched_at,
    }
}
