//! Movie catalogue endpoints.
//!
//! Reads need `movies:read`, writes need `movies:write`. Partial updates apply
//! onto the record as read and are written back conditionally on its version,
//! so a concurrent edit surfaces as 409 instead of being overwritten.

use super::{MovieEnvelope, MoviesEnvelope, ensure_valid};
use crate::{
    api::{
        errors::{ApiError, ErrorMessage},
        extract::Permitted,
        state::AppState,
    },
    auth::{MoviesRead, MoviesWrite},
    models::{
        Filters, MoviePatch, MovieQuery, NewMovie, movie::MOVIE_SORT_SAFELIST,
    },
    validator::Validator,
};
use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::IntoParams;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 20;
const DEFAULT_SORT: &str = "id";

/// Raw list parameters. Kept as strings so bad integers become field errors.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMoviesParams {
    /// Words that must all appear in the title.
    pub title: Option<String>,
    /// Comma separated genres; every one must be present.
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    /// Column to sort by, `-` prefixed for descending.
    pub sort: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/movies",
    params(ListMoviesParams),
    responses(
        (status = 200, description = "Matching movies", body = MoviesEnvelope),
        (status = 401, description = "Not authenticated", body = ErrorMessage),
        (status = 403, description = "Inactive account or missing permission", body = ErrorMessage),
        (status = 422, description = "Invalid filters")
    ),
    security(("bearer" = [])),
    tag = "movies"
)]
pub async fn list_movies(
    _permit: Permitted<MoviesRead>,
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<ListMoviesParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let mut v = Validator::new();
    let page = read_int(&mut v, params.page.as_deref(), "page", DEFAULT_PAGE);
    let page_size = read_int(
        &mut v,
        params.page_size.as_deref(),
        "page_size",
        DEFAULT_PAGE_SIZE,
    );
    let filters = Filters {
        page,
        page_size,
        sort: params.sort.unwrap_or_else(|| DEFAULT_SORT.to_string()),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };
    filters.validate(&mut v);
    ensure_valid(v)?;

    let query = MovieQuery {
        title: params.title.unwrap_or_default(),
        genres: read_csv(params.genres.as_deref()),
        sort: filters.sort_order()?,
        limit: filters.limit(),
        offset: filters.offset(),
    };
    let movies = state.stores().movies.list(&query).await?;

    Ok(Json(MoviesEnvelope { movies }))
}

#[utoipa::path(
    post,
    path = "/v1/movies",
    request_body = NewMovie,
    responses(
        (status = 201, description = "Movie created", body = MovieEnvelope),
        (status = 400, description = "Malformed body", body = ErrorMessage),
        (status = 403, description = "Inactive account or missing permission", body = ErrorMessage),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "movies"
)]
pub async fn create_movie(
    permit: Permitted<MoviesWrite>,
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<NewMovie>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    input.validate(&mut v);
    ensure_valid(v)?;

    let movie = state.stores().movies.insert(input).await?;
    info!(movie_id = movie.id, user_id = permit.user.id, "movie created");

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(|err| ApiError::Internal(err.into()))?;
    headers.insert(LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(MovieEnvelope { movie })))
}

#[utoipa::path(
    get,
    path = "/v1/movies/{id}",
    params(("id" = i64, Path, description = "Movie id")),
    responses(
        (status = 200, description = "The movie", body = MovieEnvelope),
        (status = 404, description = "No such movie", body = ErrorMessage)
    ),
    security(("bearer" = [])),
    tag = "movies"
)]
pub async fn show_movie(
    _permit: Permitted<MoviesRead>,
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let movie = state
        .stores()
        .movies
        .get(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(MovieEnvelope { movie }))
}

#[utoipa::path(
    patch,
    path = "/v1/movies/{id}",
    params(("id" = i64, Path, description = "Movie id")),
    request_body(content = NewMovie, description = "Any subset of the movie fields"),
    responses(
        (status = 200, description = "Updated movie", body = MovieEnvelope),
        (status = 404, description = "No such movie", body = ErrorMessage),
        (status = 409, description = "Edit conflict", body = ErrorMessage),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "movies"
)]
pub async fn update_movie(
    _permit: Permitted<MoviesWrite>,
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<MoviePatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let mut movie = state
        .stores()
        .movies
        .get(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let Json(patch) = payload?;
    patch.apply(&mut movie);

    let mut v = Validator::new();
    movie.validate(&mut v);
    ensure_valid(v)?;

    state.stores().movies.update(&mut movie).await?;
    Ok(Json(MovieEnvelope { movie }))
}

/// Ids below 1 cannot exist, so they are reported as not found.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

fn read_int(v: &mut Validator, raw: Option<&str>, field: &str, default: i64) -> i64 {
    match raw {
        None | Some("") => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(field, "must be an integer value");
            default
        }),
    }
}

fn read_csv(raw: Option<&str>) -> Vec<String> {
    match raw {
        None | Some("") => Vec::new(),
        Some(raw) => raw.split(',').map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_below_one_are_not_found() {
        assert!(matches!(parse_id("0"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("-3"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("12"), Ok(12)));
    }

    #[test]
    fn read_int_records_bad_values() {
        let mut v = Validator::new();
        assert_eq!(read_int(&mut v, None, "page", 1), 1);
        assert_eq!(read_int(&mut v, Some("3"), "page", 1), 3);
        assert!(v.valid());

        assert_eq!(read_int(&mut v, Some("three"), "page", 1), 1);
        assert_eq!(
            v.errors().get("page").map(String::as_str),
            Some("must be an integer value")
        );
    }

    #[test]
    fn read_csv_splits_on_commas() {
        assert!(read_csv(None).is_empty());
        assert_eq!(read_csv(Some("drama,comedy")), ["drama", "comedy"]);
    }
}
