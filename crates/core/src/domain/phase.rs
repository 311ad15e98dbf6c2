use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A named stage of work requested by a collaborator.
///
/// Phases are ordered lexicographically by label. The empty label is the
/// default phase: it sorts before every other phase and is always dispatched
/// first, to every eligible collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phase(String);

impl Phase {
    /// The default phase every dispatch run starts from.
    pub fn initial() -> Self {
        Self(String::new())
    }

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a request for `self`, made while `current` was being
    /// processed, may still be scheduled.
    pub fn follows(&self, current: &Phase) -> bool {
        self > current
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial() {
            f.write_str("--default--")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Phase {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Phase {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl Borrow<str> for Phase {
    fn borrow(&self) -> &str {
        &self.0
    }
}
