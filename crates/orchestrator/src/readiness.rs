//! Bounded wait for collaborators to come online.

use events::{Event, EventBus};
use multiverse_core::{Capability, ReadinessSettings};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::collaborator::{with_capability, SharedCollaborator};
use crate::error::{OrchestratorError, Result};

/// Shortest period the progress reporter ticks at.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Measured from the moment the barrier is entered
    pub timeout: Duration,
    /// Pause between failed probes of one collaborator
    pub backoff: Duration,
    /// How often the still-waiting set is reported
    pub report_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self::from(&ReadinessSettings::default())
    }
}

impl From<&ReadinessSettings> for ReadinessConfig {
    fn from(settings: &ReadinessSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            backoff: settings.backoff(),
            report_interval: settings.report_interval().max(MIN_REPORT_INTERVAL),
        }
    }
}

impl ReadinessConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Intervals below [`MIN_REPORT_INTERVAL`] are raised to it.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval.max(MIN_REPORT_INTERVAL);
        self
    }
}

type Waiting = Arc<Mutex<BTreeSet<String>>>;

pub struct ReadinessBarrier {
    config: ReadinessConfig,
    event_bus: Option<EventBus>,
}

impl ReadinessBarrier {
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Wait until every status-capable collaborator has answered its probe
    /// healthily once.
    ///
    /// Each collaborator is probed on its own task, retrying after
    /// `backoff` until `timeout` has passed. While any remain, the still
    /// waiting ones are reported every `report_interval`. All probe tasks
    /// run to completion; the first collaborator that missed the deadline
    /// is returned as [`OrchestratorError::NotReady`].
    pub async fn await_ready(&self, collaborators: &[SharedCollaborator]) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;

        let candidates = with_capability(collaborators, Capability::Status);
        if candidates.is_empty() {
            debug!("No collaborators expose a status probe");
            return Ok(());
        }

        let waiting: Waiting = Arc::new(Mutex::new(
            candidates.iter().map(|c| c.name().to_string()).collect(),
        ));

        let (stop_tx, stop_rx) = oneshot::channel();
        let reporter = tokio::spawn(report_progress(
            Arc::clone(&waiting),
            self.config.report_interval,
            started,
            self.event_bus.clone(),
            stop_rx,
        ));

        let mut probes = JoinSet::new();
        for collaborator in candidates {
            probes.spawn(wait_for(
                collaborator,
                deadline,
                self.config.backoff,
                Arc::clone(&waiting),
                self.event_bus.clone(),
            ));
        }

        let mut first_failure = None;
        while let Some(joined) = probes.join_next().await {
            let outcome = joined.map_err(|e| OrchestratorError::TaskFailed(e.to_string()));
            if let Err(error) = outcome.and_then(|probe| probe) {
                warn!(error = %error, "Collaborator did not become ready");
                first_failure.get_or_insert(error);
            }
        }

        let _ = stop_tx.send(());
        if let Err(e) = reporter.await {
            debug!(error = %e, "Readiness reporter ended abnormally");
        }

        match first_failure {
            Some(error) => Err(error),
            None => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "All collaborators online");
                Ok(())
            }
        }
    }
}

/// Probe one collaborator until it is healthy or the deadline has passed.
async fn wait_for(
    collaborator: SharedCollaborator,
    deadline: Instant,
    backoff: Duration,
    waiting: Waiting,
    event_bus: Option<EventBus>,
) -> Result<()> {
    let name = collaborator.name().to_string();
    loop {
        let reason = match collaborator.probe().await {
            Ok(report) if report.ok => break,
            Ok(report) => format!("{} status check failed: {}", name, report.message),
            Err(error) => error.to_string(),
        };

        if Instant::now() >= deadline {
            if let Some(bus) = &event_bus {
                bus.emit(Event::CollaboratorNotReady {
                    collaborator: name.clone(),
                    reason: reason.clone(),
                });
            }
            return Err(OrchestratorError::not_ready(name, reason));
        }

        debug!(collaborator = %name, reason = %reason, "Not ready yet, retrying");
        tokio::time::sleep(backoff).await;
    }

    waiting.lock().await.remove(&name);
    debug!(collaborator = %name, "Collaborator online");
    if let Some(bus) = &event_bus {
        bus.emit(Event::CollaboratorReady { collaborator: name });
    }
    Ok(())
}

async fn report_progress(
    waiting: Waiting,
    interval: Duration,
    started: Instant,
    event_bus: Option<EventBus>,
    mut stop: oneshot::Receiver<()>,
) {
    let interval = interval.max(MIN_REPORT_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let names: Vec<String> = waiting.lock().await.iter().cloned().collect();
                if names.is_empty() {
                    break;
                }
                info!("Still waiting for {} to come online...", names.join(", "));
                if let Some(bus) = &event_bus {
                    bus.emit(Event::ReadinessWaiting {
                        waiting: names,
                        elapsed_secs: started.elapsed().as_secs(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReadinessConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.backoff, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_config_builders() {
        let config = ReadinessConfig::default()
            .with_timeout(Duration::from_secs(10))
            .with_backoff(Duration::from_millis(50))
            .with_report_interval(Duration::from_millis(200));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.backoff, Duration::from_millis(50));
        assert_eq!(config.report_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_zero_report_interval_is_raised() {
        let config = ReadinessConfig::default().with_report_interval(Duration::ZERO);
        assert_eq!(config.report_interval, MIN_REPORT_INTERVAL);

        let settings = ReadinessSettings {
            report_interval_secs: 0,
            ..ReadinessSettings::default()
        };
        assert_eq!(ReadinessConfig::from(&settings).report_interval, MIN_REPORT_INTERVAL);
    }

    #[tokio::test]
    async fn test_no_status_collaborators_is_immediately_ready() {
        let barrier = ReadinessBarrier::new(ReadinessConfig::default());
        barrier.await_ready(&[]).await.unwrap();
    }
}
