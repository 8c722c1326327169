//! Permission codes granted to accounts.

use std::collections::BTreeSet;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Snapshot of the codes held by one account, read fresh for each request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    #[must_use]
    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Type-level permission code, used by the `Permitted` extractor.
pub trait PermissionCode {
    const CODE: &'static str;
}

pub struct MoviesRead;

impl PermissionCode for MoviesRead {
    const CODE: &'static str = MOVIES_READ;
}

pub struct MoviesWrite;

impl PermissionCode for MoviesWrite {
    const CODE: &'static str = MOVIES_WRITE;
}
