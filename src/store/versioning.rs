//! Optimistic concurrency for mutable records.
//!
//! A record is read together with its `version`. The write that follows is
//! conditional: it applies only if the stored version still equals the one
//! read, and bumps it by exactly one. When another writer got there first the
//! write matches nothing and the caller sees `StoreError::EditConflict`; the
//! stored record is left as the winner wrote it. Nothing here retries.

use super::StoreError;
use crate::models::{Movie, User};

/// Version assigned to a record when it is first stored.
pub const INITIAL_VERSION: i32 = 1;

pub trait Versioned {
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
}

impl Versioned for User {
    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

impl Versioned for Movie {
    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

/// Interpret the row returned by a conditional `UPDATE ... RETURNING version`.
///
/// # Errors
/// Returns `StoreError::EditConflict` when no row matched.
pub fn conditional_update<R: Versioned>(
    record: &mut R,
    returned_version: Option<i32>,
) -> Result<(), StoreError> {
    match returned_version {
        Some(version) => {
            record.set_version(version);
            Ok(())
        }
        None => Err(StoreError::EditConflict),
    }
}

/// Compare-and-swap for an in-memory slot. The caller must hold the lock that
/// guards `stored` for the duration of the call.
///
/// # Errors
/// Returns `StoreError::EditConflict` if `stored` moved past `update`'s version.
pub fn compare_and_swap<R: Versioned + Clone>(
    stored: &mut R,
    update: &mut R,
) -> Result<(), StoreError> {
    if stored.version() != update.version() {
        return Err(StoreError::EditConflict);
    }
    update.set_version(update.version() + 1);
    *stored = update.clone();
    Ok(())
}
