use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// One-shot lifecycle operations dispatched around a test run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleOp {
    BeforeAll,
    BeforeEach,
    Pause,
    Resume,
    AfterEach,
    AfterAll,
}

impl LifecycleOp {
    pub const ALL: [LifecycleOp; 6] = [
        Self::BeforeAll,
        Self::BeforeEach,
        Self::Pause,
        Self::Resume,
        Self::AfterEach,
        Self::AfterAll,
    ];

    /// The action path segment on the collaborator's test support endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAll => "before-all",
            Self::BeforeEach => "before-each",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::AfterEach => "after-each",
            Self::AfterAll => "after-all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleOp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownLifecycleOp(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_names() {
        assert_eq!(LifecycleOp::BeforeAll.as_str(), "before-all");
        assert_eq!(LifecycleOp::parse("after-each"), Some(LifecycleOp::AfterEach));
        assert_eq!(LifecycleOp::parse("sync"), None);
    }

    #[test]
    fn test_from_str_error() {
        let err = "teardown".parse::<LifecycleOp>().unwrap_err();
        assert!(err.to_string().contains("teardown"));
        assert_eq!("pause".parse::<LifecycleOp>().unwrap(), LifecycleOp::Pause);
    }
}
