use super::{Patch, SortOrder};
use crate::validator::{Validator, unique};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Sort values accepted by the movie list endpoint.
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

const FIRST_FILM_YEAR: i32 = 1888;

/// Running time in minutes, written on the wire as `"<n> mins"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

#[derive(Debug, thiserror::Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(minutes), Some("mins"), None) => minutes
                .parse::<i32>()
                .map(Self)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    #[schema(value_type = String, example = "102 mins")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    pub fn validate(&self, v: &mut Validator) {
        validate_fields(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

/// Payload for creating a movie. Missing fields decode to zero values and are
/// reported by validation rather than by the decoder.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    #[schema(value_type = String, example = "102 mins")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

impl NewMovie {
    pub fn validate(&self, v: &mut Validator) {
        validate_fields(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

/// Partial update payload; only the keys present in the body are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MoviePatch {
    pub title: Patch<String>,
    pub year: Patch<i32>,
    pub runtime: Patch<Runtime>,
    pub genres: Patch<Vec<String>>,
}

impl MoviePatch {
    /// Apply the supplied fields onto a previously read record. The version is
    /// left untouched so the conditional write still checks the read version.
    pub fn apply(self, movie: &mut Movie) {
        self.title.apply_to(&mut movie.title);
        self.year.apply_to(&mut movie.year);
        self.runtime.apply_to(&mut movie.runtime);
        self.genres.apply_to(&mut movie.genres);
    }
}

/// Resolved list query handed to the store.
#[derive(Clone, Debug)]
pub struct MovieQuery {
    pub title: String,
    pub genres: Vec<String>,
    pub sort: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

fn validate_fields(v: &mut Validator, title: &str, year: i32, runtime: Runtime, genres: &[String]) {
    v.check(!title.is_empty(), "title", "must be provided");
    v.check(
        title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(year != 0, "year", "must be provided");
    v.check(year >= FIRST_FILM_YEAR, "year", "must be greater than 1888");
    v.check(year <= Utc::now().year(), "year", "must not be in the future");

    v.check(runtime.0 != 0, "runtime", "must be provided");
    v.check(runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(genres), "genres", "must not contain duplicate values");
}
