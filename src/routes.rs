//! HTTP boundary for the movie lookups.
//!
//! - `GET /` - banner
//! - `GET /api/movies/search` - cached search with optional filters
//! - `GET /api/movies/{imdb_id}` - single movie
//! - `GET /api/movies/getById?imdbId=` - single movie, query-string form
//! - `DELETE /api/movies/refresh-cache` - purge expired records

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::lookup::SearchFilters;
use crate::types::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(info))
        .route("/api/movies/search", get(search))
        .route("/api/movies/getById", get(get_by_query))
        .route("/api/movies/refresh-cache", delete(refresh_cache))
        .route("/api/movies/{imdb_id}", get(get_by_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn info() -> &'static str {
    "MovieFlix API is running!"
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(default)]
    pub search: String,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let filters = SearchFilters {
        genre: params.genre,
        year: params.year,
        min_rating: params.min_rating,
    };
    let movies = state.lookup.search_movies(&params.search, &filters).await?;

    if movies.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No results found" })),
        )
            .into_response());
    }

    Ok(Json(movies).into_response())
}

async fn get_by_path(
    State(state): State<AppState>,
    Path(imdb_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.lookup.get_movie_by_id(&imdb_id).await? {
        Some(movie) => Ok(Json(movie).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetByIdParams {
    pub imdb_id: Option<String>,
}

async fn get_by_query(
    State(state): State<AppState>,
    Query(params): Query<GetByIdParams>,
) -> Result<Response, ApiError> {
    let imdb_id = params.imdb_id.unwrap_or_default();
    if imdb_id.trim().is_empty() {
        return Err(ApiError::BadRequest("IMDb ID is required".to_string()));
    }

    match state.lookup.get_movie_by_id(&imdb_id).await? {
        Some(movie) => Ok(Json(movie).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            format!("No movie found for IMDb ID: {imdb_id}"),
        )
            .into_response()),
    }
}

async fn refresh_cache(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.lookup.refresh_cache().await?;
    Ok(Json(json!({ "message": "Cache refreshed" })).into_response())
}
