//! RequestKey - cache / throttle key derived from request identity.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::action::ActionParameter;

/// Combined hash of `(request id, action parameter)`.
///
/// `DefaultHasher::new()` uses fixed keys, so identical inputs give the same
/// key for the lifetime of the process. Keys are not meant to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(u64);

impl RequestKey {
    pub fn derive<ID: Hash + ?Sized>(id: &ID, action: &ActionParameter) -> Self {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        action.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key-{:016x}", self.0)
    }
}
