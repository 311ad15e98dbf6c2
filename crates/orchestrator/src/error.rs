use multiverse_core::{CoreError, Phase};
use remote::RemoteError;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use thiserror::Error;

/// Failure of a single call to a single collaborator.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// The collaborator could not be reached
    #[error("{collaborator} unreachable: {reason}")]
    Transport { collaborator: String, reason: String },

    /// The collaborator answered but reported failure
    #[error("{collaborator} failed: {message}")]
    Application {
        collaborator: String,
        message: String,
        trace: Option<String>,
    },

    /// The call panicked instead of returning
    #[error("{collaborator} call panicked: {reason}")]
    Panicked { collaborator: String, reason: String },
}

impl CollaboratorError {
    pub fn transport(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    pub fn application(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            collaborator: collaborator.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn collaborator(&self) -> &str {
        match self {
            Self::Transport { collaborator, .. }
            | Self::Application { collaborator, .. }
            | Self::Panicked { collaborator, .. } => collaborator,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<RemoteError> for CollaboratorError {
    fn from(err: RemoteError) -> Self {
        let collaborator = err.app().to_string();
        match err {
            RemoteError::Request { source, .. } => Self::Transport {
                collaborator,
                reason: source.to_string(),
            },
            RemoteError::Application { message, trace, .. } => Self::Application {
                collaborator,
                message,
                trace,
            },
            other => Self::Application {
                collaborator,
                message: other.to_string(),
                trace: None,
            },
        }
    }
}

/// One failed call within a phase step.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub collaborator: String,
    pub phase: Phase,
    pub error: CollaboratorError,
}

/// Every failure from one phase step, raised once all calls of the step
/// have returned.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed with errors from {} collaborator(s) at phase {phase}:{}", .failures.len(), summarize(.failures))]
pub struct AggregateDispatchError {
    pub operation: String,
    pub phase: Phase,
    pub failures: Vec<DispatchFailure>,
    /// Phases still scheduled when the run stopped, including any requested
    /// by collaborators that succeeded in the failing step.
    pub pending_phases: Vec<Phase>,
}

impl AggregateDispatchError {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_collaborators(&self) -> BTreeSet<&str> {
        self.failures
            .iter()
            .map(|f| f.collaborator.as_str())
            .collect()
    }
}

fn summarize(failures: &[DispatchFailure]) -> String {
    let mut summary = String::new();
    for failure in failures {
        let _ = write!(summary, "\n  - {}", failure.error);
    }
    summary
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{collaborator} did not come online before the deadline: {reason}")]
    NotReady { collaborator: String, reason: String },

    #[error(transparent)]
    Dispatch(#[from] AggregateDispatchError),

    #[error("Sync did not converge after {rounds} rounds (last round reported {last_change_count} changes)")]
    NotConverged { rounds: u32, last_change_count: i64 },

    #[error("you need to add {0} as a managed app before using it")]
    UnknownCollaborator(String),

    #[error("wrong set of integrated apps: want {want:?} but got {got:?}")]
    TopologyMismatch {
        want: BTreeSet<String>,
        got: BTreeSet<String>,
    },

    #[error("No topology is integrated")]
    NotIntegrated,

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    pub fn not_ready(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotReady {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str, error: CollaboratorError) -> DispatchFailure {
        DispatchFailure {
            collaborator: name.to_string(),
            phase: Phase::initial(),
            error,
        }
    }

    #[test]
    fn test_aggregate_names_every_failure() {
        let error = AggregateDispatchError {
            operation: "before-all".to_string(),
            phase: Phase::initial(),
            failures: vec![
                failure("app1", CollaboratorError::transport("app1", "connection refused")),
                failure("app2", CollaboratorError::application("app2", "fixtures missing")),
            ],
            pending_phases: vec![],
        };

        let message = error.to_string();
        assert!(message.contains("errors from 2 collaborator(s)"));
        assert!(message.contains("app1 unreachable: connection refused"));
        assert!(message.contains("app2 failed: fixtures missing"));
        assert_eq!(
            error.failed_collaborators().into_iter().collect::<Vec<_>>(),
            vec!["app1", "app2"]
        );
    }

    #[test]
    fn test_dispatch_error_is_transparent() {
        let aggregate = AggregateDispatchError {
            operation: "sync".to_string(),
            phase: Phase::from("phase1"),
            failures: vec![failure("app1", CollaboratorError::application("app1", "boom"))],
            pending_phases: vec![],
        };
        let error = OrchestratorError::from(aggregate);
        assert!(error.to_string().starts_with("sync failed with errors from 1 collaborator(s) at phase phase1"));
    }

    #[test]
    fn test_from_remote_application_error() {
        let remote = RemoteError::Application {
            app: "ledger".to_string(),
            url: "http://localhost/_test-support/sync".to_string(),
            message: "lock timeout".to_string(),
            trace: Some("Ledger.sync".to_string()),
        };
        match CollaboratorError::from(remote) {
            CollaboratorError::Application {
                collaborator,
                message,
                trace,
            } => {
                assert_eq!(collaborator, "ledger");
                assert_eq!(message, "lock timeout");
                assert_eq!(trace.as_deref(), Some("Ledger.sync"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_from_remote_other_error() {
        let remote = RemoteError::NotSupported {
            app: "static".to_string(),
            capability: "a status endpoint",
        };
        let error = CollaboratorError::from(remote);
        assert_eq!(error.collaborator(), "static");
        assert!(!error.is_transport());
    }
}
