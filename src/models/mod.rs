//! Records exchanged between handlers and the store.

pub mod filters;
pub mod movie;
pub mod patch;
pub mod user;

pub use filters::{Filters, InvariantViolation, SortDirection, SortOrder};
pub use movie::{Movie, MoviePatch, MovieQuery, NewMovie, Runtime};
pub use patch::Patch;
pub use user::{NewUser, User};
