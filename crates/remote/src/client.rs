use multiverse_core::{
    Capabilities, CollaboratorInfo, DispatchResult, LifecycleOp, Phase, StatusReport,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::error::{RemoteError, Result};
use crate::types::{ErrorBody, PhaseForm};

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);
const SYNC_ACTION: &str = "sync";
const TEST_SUPPORT_PREFIX: &str = "/_test-support/";

/// HTTP client for one collaborator's status and test support endpoints.
#[derive(Clone)]
pub struct RemoteApp {
    info: CollaboratorInfo,
    client: Client,
    report_interval: Duration,
}

impl RemoteApp {
    pub fn new(info: CollaboratorInfo) -> Self {
        Self::with_client(info, Client::new())
    }

    pub fn with_client(info: CollaboratorInfo, client: Client) -> Self {
        Self {
            info,
            client,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    /// How often a still-running call logs that it is waiting. Never
    /// shorter than a millisecond.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval.max(MIN_REPORT_INTERVAL);
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &CollaboratorInfo {
        &self.info
    }

    pub fn capabilities(&self) -> Capabilities {
        self.info.capabilities()
    }

    pub fn provides_status(&self) -> bool {
        self.info.status_url.is_some()
    }

    pub fn provides_test_support(&self) -> bool {
        self.info.test_support_url.is_some()
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let url = self
            .info
            .status_url
            .clone()
            .ok_or_else(|| self.not_supported("a status endpoint"))?;

        let body = self.send("status", self.client.get(url.clone()), &url).await?;
        self.decode(&body)
    }

    pub async fn lifecycle(&self, op: LifecycleOp, phase: &Phase) -> Result<DispatchResult> {
        self.post_phase(op.as_str(), phase).await
    }

    pub async fn sync(&self, phase: &Phase) -> Result<DispatchResult> {
        self.post_phase(SYNC_ACTION, phase).await
    }

    /// Raw call to `/_test-support/<action>`, returning the response body.
    pub async fn call(&self, method: Method, action: &str) -> Result<String> {
        let path = format!("{}{}", TEST_SUPPORT_PREFIX, action.trim_start_matches('/'));
        let url = self.action_url(&path)?;
        self.send(action, self.client.request(method, url.clone()), &url)
            .await
    }

    async fn post_phase(&self, action: &str, phase: &Phase) -> Result<DispatchResult> {
        let url = self.action_url(action)?;
        let request = self
            .client
            .post(url.clone())
            .form(&PhaseForm {
                phase: phase.as_str(),
            });

        let body = self.send(action, request, &url).await?;
        self.decode(&body)
    }

    fn action_url(&self, action: &str) -> Result<Url> {
        let base = self
            .info
            .test_support_url
            .as_ref()
            .ok_or_else(|| self.not_supported("a test support endpoint"))?;

        base.join(action).map_err(|e| RemoteError::InvalidUrl {
            app: self.name().to_string(),
            action: action.to_string(),
            reason: e.to_string(),
        })
    }

    /// Send a request, logging every report interval until it answers.
    async fn send(&self, action: &str, request: RequestBuilder, url: &Url) -> Result<String> {
        debug!(collaborator = %self.name(), url = %url, "Connecting");

        let started = Instant::now();
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        tokio::pin!(exchange);

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.report_interval,
            self.report_interval,
        );
        let (status, body) = loop {
            tokio::select! {
                result = &mut exchange => {
                    break result.map_err(|source| RemoteError::Request {
                        app: self.name().to_string(),
                        action: action.to_string(),
                        source,
                    })?;
                }
                _ = ticker.tick() => {
                    info!(
                        collaborator = %self.name(),
                        action,
                        elapsed_secs = started.elapsed().as_secs(),
                        "[{}] waiting on {} for {}s",
                        self.name(),
                        action,
                        started.elapsed().as_secs()
                    );
                }
            }
        };

        if status.is_success() {
            return Ok(body);
        }

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) if error.message.is_some() || error.trace.is_some() => {
                Err(RemoteError::Application {
                    app: self.name().to_string(),
                    url: url.to_string(),
                    message: error.message.unwrap_or_default(),
                    trace: error.trace,
                })
            }
            _ => Err(RemoteError::InvalidResponse {
                app: self.name().to_string(),
                status: status.as_u16(),
                body,
            }),
        }
    }

    fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|source| RemoteError::Serialization {
            app: self.name().to_string(),
            body: body.to_string(),
            source,
        })
    }

    fn not_supported(&self, capability: &'static str) -> RemoteError {
        RemoteError::NotSupported {
            app: self.name().to_string(),
            capability,
        }
    }
}

impl std::fmt::Debug for RemoteApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApp")
            .field("name", &self.info.name)
            .field("capabilities", &self.capabilities().to_string())
            .finish()
    }
}
