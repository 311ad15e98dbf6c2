//! Domain types shared by the multiverse acceptance harness.
//!
//! Collaborators, phases, dispatch results and the topology configuration
//! that maps collaborator names to their endpoints.

pub mod config;
pub mod domain;
pub mod error;

pub use config::{
    AppConfig, EndpointConfig, ProvisionerConfig, ReadinessSettings, SyncSettings, TopologyConfig,
};
pub use domain::*;
pub use error::{CoreError, Result};
