mod collaborator;
mod dispatch;
mod lifecycle;
mod phase;

pub use collaborator::{Capabilities, Capability, CollaboratorInfo};
pub use dispatch::{DispatchResult, StatusReport};
pub use lifecycle::LifecycleOp;
pub use phase::Phase;
