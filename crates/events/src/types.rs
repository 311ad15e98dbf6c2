//! Event types published while a topology is brought up and driven

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Readiness events
    /// Periodic report of collaborators whose status probe has not passed yet
    #[serde(rename = "readiness.waiting")]
    ReadinessWaiting {
        waiting: Vec<String>,
        elapsed_secs: u64,
    },

    /// A collaborator's status probe passed
    #[serde(rename = "readiness.ready")]
    CollaboratorReady { collaborator: String },

    /// A collaborator was still failing its probe at the deadline
    #[serde(rename = "readiness.failed")]
    CollaboratorNotReady { collaborator: String, reason: String },

    // Dispatch events
    /// A phase step is about to fan out
    #[serde(rename = "phase.started")]
    PhaseStarted {
        operation: String,
        phase: String,
        collaborators: Vec<String>,
    },

    /// Every call of a phase step has returned
    #[serde(rename = "phase.completed")]
    PhaseCompleted {
        operation: String,
        phase: String,
        failures: usize,
    },

    /// One full sync round finished
    #[serde(rename = "sync.round_completed")]
    SyncRoundCompleted { round: u32, change_count: i64 },

    // Topology events
    /// A new set of collaborators was integrated
    #[serde(rename = "topology.integrated")]
    TopologyIntegrated { apps: Vec<String> },

    /// The current topology was torn down
    #[serde(rename = "topology.torn_down")]
    TopologyTornDown { apps: Vec<String> },
}

impl Event {
    /// Get the phase label associated with this event, if any
    pub fn phase(&self) -> Option<&str> {
        match self {
            Event::PhaseStarted { phase, .. } | Event::PhaseCompleted { phase, .. } => {
                Some(phase.as_str())
            }
            _ => None,
        }
    }

    /// Whether this event names `collaborator`
    pub fn mentions(&self, collaborator: &str) -> bool {
        match self {
            Event::ReadinessWaiting { waiting, .. } => waiting.iter().any(|c| c == collaborator),
            Event::CollaboratorReady { collaborator: c }
            | Event::CollaboratorNotReady { collaborator: c, .. } => c == collaborator,
            Event::PhaseStarted { collaborators, .. } => {
                collaborators.iter().any(|c| c == collaborator)
            }
            Event::TopologyIntegrated { apps } | Event::TopologyTornDown { apps } => {
                apps.iter().any(|c| c == collaborator)
            }
            _ => false,
        }
    }
}
