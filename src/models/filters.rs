//! Paging and sort parameters for list endpoints.

use crate::validator::{Validator, permitted_value};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A condition that validation should have made impossible was observed anyway.
#[derive(Debug, thiserror::Error)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A sort column taken from a safelist plus its direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub direction: SortDirection,
}

#[derive(Clone, Debug)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            self.page_size <= MAX_PAGE_SIZE,
            "page_size",
            "must be a maximum of 100",
        );
        v.check(
            permitted_value(&self.sort.as_str(), self.sort_safelist),
            "sort",
            "invalid sort value",
        );
    }

    /// Resolve the sort parameter to a column name from the safelist.
    ///
    /// The returned name is interpolated into SQL, so anything not on the
    /// safelist is refused even if validation was skipped.
    ///
    /// # Errors
    /// Returns `InvariantViolation` when `sort` is not a safelisted value.
    pub fn sort_column(&self) -> Result<&'static str, InvariantViolation> {
        self.sort_safelist
            .iter()
            .find(|candidate| **candidate == self.sort)
            .map(|candidate| candidate.trim_start_matches('-'))
            .ok_or_else(|| InvariantViolation(format!("unsafe sort parameter: {}", self.sort)))
    }

    #[must_use]
    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    /// # Errors
    /// Returns `InvariantViolation` when `sort` is not a safelisted value.
    pub fn sort_order(&self) -> Result<SortOrder, InvariantViolation> {
        Ok(SortOrder {
            column: self.sort_column()?,
            direction: self.sort_direction(),
        })
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.page_size
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}
