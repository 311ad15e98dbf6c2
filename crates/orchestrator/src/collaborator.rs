//! The seam between the orchestration engine and whatever actually talks to
//! a collaborator.

use async_trait::async_trait;
use multiverse_core::{Capabilities, Capability, DispatchResult, LifecycleOp, Phase, StatusReport};
use remote::RemoteApp;
use std::sync::Arc;

use crate::error::CollaboratorError;

/// A remote participant in a test run.
///
/// Implementations must be cheap to share across tasks; the engine holds
/// them as [`SharedCollaborator`] and calls them concurrently.
#[async_trait]
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Ask the collaborator whether it is up. An unhealthy answer is
    /// `Ok` with `ok == false`; an unreachable collaborator is `Err`.
    async fn probe(&self) -> Result<StatusReport, CollaboratorError>;

    async fn invoke(
        &self,
        op: LifecycleOp,
        phase: &Phase,
    ) -> Result<DispatchResult, CollaboratorError>;

    async fn sync(&self, phase: &Phase) -> Result<DispatchResult, CollaboratorError>;

    fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }
}

pub type SharedCollaborator = Arc<dyn Collaborator>;

/// Collaborators from `all` that expose `capability`, in their original order.
pub fn with_capability(all: &[SharedCollaborator], capability: Capability) -> Vec<SharedCollaborator> {
    all.iter()
        .filter(|c| c.has(capability))
        .cloned()
        .collect()
}

#[async_trait]
impl Collaborator for RemoteApp {
    fn name(&self) -> &str {
        RemoteApp::name(self)
    }

    fn capabilities(&self) -> Capabilities {
        RemoteApp::capabilities(self)
    }

    async fn probe(&self) -> Result<StatusReport, CollaboratorError> {
        Ok(self.status().await?)
    }

    async fn invoke(
        &self,
        op: LifecycleOp,
        phase: &Phase,
    ) -> Result<DispatchResult, CollaboratorError> {
        Ok(self.lifecycle(op, phase).await?)
    }

    async fn sync(&self, phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        Ok(RemoteApp::sync(self, phase).await?)
    }
}
