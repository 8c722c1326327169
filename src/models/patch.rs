use serde::{Deserialize, Deserializer};

/// One field of a partial update: either absent from the payload or set to a value.
///
/// Decode with `#[serde(default)]` on the field so a missing key stays `Unset`.
/// An explicit `null` is rejected unless `T` itself accepts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Patch<T> {
    /// Overwrite `target` when a value was supplied.
    pub fn apply_to(self, target: &mut T) {
        if let Self::Set(value) = self {
            *target = value;
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Self::Set)
    }
}
