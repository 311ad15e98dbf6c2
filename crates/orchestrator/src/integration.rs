use events::EventBus;
use multiverse_core::{Capability, LifecycleOp, TopologyConfig};
use remote::RemoteApp;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::collaborator::{with_capability, SharedCollaborator};
use crate::convergence::{ConvergenceConfig, ConvergenceLoop, SyncSummary};
use crate::dispatcher::{PhaseDispatcher, PhaseRun};
use crate::error::{OrchestratorError, Result};
use crate::readiness::{ReadinessBarrier, ReadinessConfig};

/// One integrated topology: its configuration and the collaborators in it.
pub struct Integration {
    config: TopologyConfig,
    collaborators: Vec<SharedCollaborator>,
    readiness: ReadinessConfig,
    convergence: ConvergenceConfig,
    event_bus: Option<EventBus>,
}

impl Integration {
    /// Build HTTP collaborators for every app in `config`.
    pub fn from_config(config: TopologyConfig) -> Result<Self> {
        let collaborators = remote_collaborators(&config)?;
        Ok(Self::new(config, collaborators))
    }

    /// Readiness and convergence settings are taken from `config`.
    pub fn new(config: TopologyConfig, collaborators: Vec<SharedCollaborator>) -> Self {
        let readiness = ReadinessConfig::from(&config.readiness);
        let convergence = ConvergenceConfig::from(&config.sync);
        Self {
            config,
            collaborators,
            readiness,
            convergence,
            event_bus: None,
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &[SharedCollaborator] {
        &self.collaborators
    }

    pub fn integrated_apps(&self) -> BTreeSet<String> {
        self.collaborators
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn collaborator(&self, name: &str) -> Result<SharedCollaborator> {
        self.collaborators
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownCollaborator(name.to_string()))
    }

    /// Wait for the topology to come online.
    pub async fn check_configuration(&self) -> Result<()> {
        info!(apps = ?self.integrated_apps(), "Integrating apps");
        let mut barrier = ReadinessBarrier::new(self.readiness.clone());
        if let Some(bus) = &self.event_bus {
            barrier = barrier.with_event_bus(bus.clone());
        }
        barrier.await_ready(&self.collaborators).await
    }

    /// Dispatch `op` through every phase the collaborators request.
    pub async fn run_lifecycle(&self, op: LifecycleOp) -> Result<PhaseRun> {
        let instrumented = with_capability(&self.collaborators, Capability::LifecycleOps);
        let mut dispatcher = PhaseDispatcher::new(op.as_str());
        if let Some(bus) = &self.event_bus {
            dispatcher = dispatcher.with_event_bus(bus.clone());
        }

        let run = dispatcher
            .run_phases(&instrumented, move |collaborator, phase| async move {
                collaborator.invoke(op, &phase).await
            })
            .await?;
        Ok(run)
    }

    pub async fn before_all(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::BeforeAll).await.map(drop)
    }

    pub async fn before_each(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::BeforeEach).await.map(drop)
    }

    pub async fn pause(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::Pause).await.map(drop)
    }

    pub async fn resume(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::Resume).await.map(drop)
    }

    pub async fn after_each(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::AfterEach).await.map(drop)
    }

    pub async fn after_all(&self) -> Result<()> {
        self.run_lifecycle(LifecycleOp::AfterAll).await.map(drop)
    }

    /// Per-test setup: pause, run before-each, resume.
    pub async fn before(&self) -> Result<()> {
        self.pause().await?;
        self.before_each().await?;
        self.resume().await
    }

    pub async fn sync_apps(&self) -> Result<SyncSummary> {
        let mut convergence = ConvergenceLoop::new(self.convergence.clone());
        if let Some(bus) = &self.event_bus {
            convergence = convergence.with_event_bus(bus.clone());
        }
        convergence.sync_until_stable(&self.collaborators).await
    }

    pub fn remap_uri(&self, uri: &Url) -> Result<Url> {
        Ok(self.config.remap_uri(uri)?)
    }

    pub fn server_certificate(&self, uri: &Url) -> Result<Option<&str>> {
        Ok(self.config.server_certificate(uri)?)
    }
}

/// HTTP collaborators for every app in `config`, in name order.
pub fn remote_collaborators(config: &TopologyConfig) -> Result<Vec<SharedCollaborator>> {
    let infos = config.collaborators()?;
    Ok(infos
        .into_iter()
        .map(|info| {
            Arc::new(
                RemoteApp::new(info).with_report_interval(config.readiness.report_interval()),
            ) as SharedCollaborator
        })
        .collect())
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("apps", &self.integrated_apps())
            .field("readiness", &self.readiness)
            .field("convergence", &self.convergence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn topology(server: &MockServer) -> TopologyConfig {
        TopologyConfig::from_toml_str(&format!(
            r#"
            [apps.ledger]
            status_uri = "{uri}/ledger/_status"
            test_support_uri = "{uri}/ledger/_test-support/"

            [apps.frontend]
            status_uri = "{uri}/frontend/_status"

            [endpoints."api.example.com"]
            uri = "{uri}"
            "#,
            uri = server.uri()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_from_config_builds_collaborators() {
        let server = MockServer::start().await;
        let integration = Integration::from_config(topology(&server)).unwrap();

        assert_eq!(
            integration.integrated_apps().into_iter().collect::<Vec<_>>(),
            vec!["frontend", "ledger"]
        );
        assert!(integration.collaborator("ledger").is_ok());
        assert!(matches!(
            integration.collaborator("billing"),
            Err(OrchestratorError::UnknownCollaborator(name)) if name == "billing"
        ));
    }

    #[tokio::test]
    async fn test_before_all_over_http_follows_requested_phase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ledger/_test-support/before-all"))
            .and(body_string("phase="))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "phases": ["seed"]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ledger/_test-support/before-all"))
            .and(body_string("phase=seed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let integration = Integration::from_config(topology(&server)).unwrap();
        let run = integration.run_lifecycle(LifecycleOp::BeforeAll).await.unwrap();

        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.steps[0].collaborators, vec!["ledger"]);
        assert_eq!(run.steps[1].phase.as_str(), "seed");
    }

    #[tokio::test]
    async fn test_check_configuration_probes_status_apps() {
        let server = MockServer::start().await;
        for app in ["ledger", "frontend"] {
            Mock::given(method("GET"))
                .and(path(format!("/{app}/_status")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
                .expect(1)
                .mount(&server)
                .await;
        }

        Integration::from_config(topology(&server))
            .unwrap()
            .check_configuration()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_apps_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ledger/_test-support/sync"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "change_count": 0})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let summary = Integration::from_config(topology(&server))
            .unwrap()
            .sync_apps()
            .await
            .unwrap();
        assert_eq!(summary.rounds, 1);
    }

    #[tokio::test]
    async fn test_remap_uri() {
        let server = MockServer::start().await;
        let integration = Integration::from_config(topology(&server)).unwrap();
        let remapped = integration
            .remap_uri(&Url::parse("https://api.example.com/v1/payments?x=1").unwrap())
            .unwrap();
        assert_eq!(remapped.path(), "/v1/payments");
        assert_eq!(remapped.query(), Some("x=1"));
        assert_eq!(remapped.host_str(), Some("127.0.0.1"));
        assert!(integration
            .server_certificate(&Url::parse("https://api.example.com/").unwrap())
            .unwrap()
            .is_none());
    }
}
