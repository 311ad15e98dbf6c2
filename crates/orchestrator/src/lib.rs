//! Bring-up, phase dispatch and sync convergence for acceptance-test
//! collaborators.
//!
//! - [`ReadinessBarrier`] waits for every status-capable collaborator to
//!   answer its probe.
//! - [`PhaseDispatcher`] fans an operation out to collaborators phase by
//!   phase, honoring follow-up phases they request.
//! - [`ConvergenceLoop`] repeats sync rounds until one reports no changes.
//! - [`Integration`] and [`Multiverse`] own a topology and drive the above
//!   around a test run.

pub mod collaborator;
pub mod convergence;
pub mod dispatcher;
pub mod error;
pub mod integration;
pub mod multiverse;
pub mod phase_queue;
pub mod provisioner;
pub mod readiness;

pub use collaborator::{Collaborator, SharedCollaborator};
pub use convergence::{ConvergenceConfig, ConvergenceLoop, SyncSummary};
pub use dispatcher::{CollaboratorResult, PhaseDispatcher, PhaseRun, PhaseStep};
pub use error::{
    AggregateDispatchError, CollaboratorError, DispatchFailure, OrchestratorError, Result,
};
pub use integration::Integration;
pub use multiverse::{FileTopologySource, Multiverse, TopologySource};
pub use phase_queue::{Assignment, PhaseQueue};
pub use provisioner::{CommandProvisioner, MissingProvisioner, Provisioner};
pub use readiness::{ReadinessBarrier, ReadinessConfig};
