//! Switching between topologies across a test run.
//!
//! A [`Multiverse`] keeps at most one [`Integration`] alive. Asking for a
//! different set of apps tears the current one down first, then loads the
//! topology, provisioning it when the running apps differ from the request.

use async_trait::async_trait;
use events::{Event, EventBus};
use multiverse_core::TopologyConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::collaborator::SharedCollaborator;
use crate::error::{OrchestratorError, Result};
use crate::integration::{remote_collaborators, Integration};
use crate::provisioner::{CommandProvisioner, MissingProvisioner, Provisioner};

/// Where the description of the running topology comes from.
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn load(&self) -> Result<TopologyConfig>;
}

/// Reads the topology from a TOML file on every load.
#[derive(Debug, Clone)]
pub struct FileTopologySource {
    path: PathBuf,
}

impl FileTopologySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TopologySource for FileTopologySource {
    async fn load(&self) -> Result<TopologyConfig> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|source| {
            multiverse_core::CoreError::ConfigRead {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        Ok(TopologyConfig::from_toml_str(&content)?)
    }
}

/// Builds the collaborators for a loaded topology.
pub type CollaboratorFactory =
    Arc<dyn Fn(&TopologyConfig) -> Result<Vec<SharedCollaborator>> + Send + Sync>;

pub struct Multiverse {
    source: Box<dyn TopologySource>,
    provisioner: Box<dyn Provisioner>,
    factory: CollaboratorFactory,
    event_bus: Option<EventBus>,
    current: Option<Integration>,
}

impl Multiverse {
    pub fn new(
        source: impl TopologySource + 'static,
        provisioner: impl Provisioner + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            provisioner: Box::new(provisioner),
            factory: Arc::new(remote_collaborators),
            event_bus: None,
            current: None,
        }
    }

    /// File-backed multiverse. The provisioner is taken from the file's
    /// `[provisioner]` section, if it has one.
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let source = FileTopologySource::new(path);
        let config = source.load().await?;
        Ok(match config.provisioner {
            Some(provisioner) => Self::new(source, CommandProvisioner::new(provisioner)),
            None => Self::new(source, MissingProvisioner),
        })
    }

    pub fn with_factory(mut self, factory: CollaboratorFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn current(&self) -> Option<&Integration> {
        self.current.as_ref()
    }

    /// Make `apps` the integrated topology and run its before-all.
    ///
    /// Does nothing when `apps` is already integrated. The new integration
    /// only becomes current once its readiness check and before-all have
    /// passed.
    pub async fn integrate(&mut self, apps: &BTreeSet<String>) -> Result<&Integration> {
        let switching = self
            .current
            .as_ref()
            .is_some_and(|current| &current.integrated_apps() != apps);
        if switching {
            self.shutdown().await?;
        }

        if self.current.is_none() {
            let mut config = self.source.load().await?;
            info!(want = ?apps, have = ?config.app_names(), "Integrating topology");

            if &config.app_names() != apps {
                self.provisioner.provision(apps).await?;
                config = self.source.load().await?;
                let got = config.app_names();
                if &got != apps {
                    return Err(OrchestratorError::TopologyMismatch {
                        want: apps.clone(),
                        got,
                    });
                }
            }

            let integration = self.build(config)?;
            integration.check_configuration().await?;
            integration.before_all().await?;

            self.emit(Event::TopologyIntegrated {
                apps: integration.integrated_apps().into_iter().collect(),
            });
            self.current = Some(integration);
        }

        self.current.as_ref().ok_or(OrchestratorError::NotIntegrated)
    }

    pub async fn on_before_each(&self) -> Result<()> {
        self.integration()?.before().await
    }

    pub async fn on_after_each(&self) -> Result<()> {
        self.integration()?.after_each().await
    }

    /// Run after-all on the current topology and forget it. The topology is
    /// forgotten even if after-all fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        let apps: Vec<String> = current.integrated_apps().into_iter().collect();
        info!(apps = ?apps, "Tearing down topology");

        let outcome = current.after_all().await;
        if let Err(e) = &outcome {
            warn!(error = %e, "After-all failed during teardown");
        }
        self.emit(Event::TopologyTornDown { apps });
        outcome
    }

    pub fn collaborator(&self, name: &str) -> Result<SharedCollaborator> {
        self.integration()?.collaborator(name)
    }

    fn integration(&self) -> Result<&Integration> {
        self.current.as_ref().ok_or(OrchestratorError::NotIntegrated)
    }

    fn build(&self, config: TopologyConfig) -> Result<Integration> {
        let collaborators = (self.factory)(&config)?;
        let integration = Integration::new(config, collaborators);
        Ok(match &self.event_bus {
            Some(bus) => integration.with_event_bus(bus.clone()),
            None => integration,
        })
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}
