//! Repeated sync rounds until the collaborators stop changing.

use events::{Event, EventBus};
use multiverse_core::{Capability, SyncSettings};
use tracing::{info, warn};

use crate::collaborator::{with_capability, SharedCollaborator};
use crate::dispatcher::PhaseDispatcher;
use crate::error::{OrchestratorError, Result};

const SYNC_OPERATION: &str = "sync";

#[derive(Debug, Clone, Default)]
pub struct ConvergenceConfig {
    /// Give up after this many rounds. `None` keeps going until a round
    /// reports zero changes.
    pub max_rounds: Option<u32>,
}

impl From<&SyncSettings> for ConvergenceConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            max_rounds: settings.max_rounds,
        }
    }
}

impl ConvergenceConfig {
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Rounds run, including the final zero-change round
    pub rounds: u32,
    /// Changes reported over all rounds
    pub total_changes: i64,
}

pub struct ConvergenceLoop {
    config: ConvergenceConfig,
    event_bus: Option<EventBus>,
}

impl ConvergenceLoop {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run full sync rounds over the sync-capable collaborators until a
    /// round's change counts sum to zero. Every round starts again from the
    /// default phase.
    pub async fn sync_until_stable(&self, collaborators: &[SharedCollaborator]) -> Result<SyncSummary> {
        let eligible = with_capability(collaborators, Capability::Sync);
        let mut dispatcher = PhaseDispatcher::new(SYNC_OPERATION);
        if let Some(bus) = &self.event_bus {
            dispatcher = dispatcher.with_event_bus(bus.clone());
        }

        let mut rounds = 0u32;
        let mut total_changes = 0i64;
        let mut last_change_count = 0i64;
        loop {
            if let Some(max_rounds) = self.config.max_rounds {
                if rounds >= max_rounds {
                    warn!(rounds, last_change_count, "Sync did not converge");
                    return Err(OrchestratorError::NotConverged {
                        rounds,
                        last_change_count,
                    });
                }
            }

            rounds += 1;
            let run = dispatcher
                .run_phases(&eligible, |collaborator, phase| async move {
                    collaborator.sync(&phase).await
                })
                .await?;

            last_change_count = run.total_changes();
            total_changes += last_change_count;
            info!(round = rounds, changes = last_change_count, "Sync round completed");
            if let Some(bus) = &self.event_bus {
                bus.emit(Event::SyncRoundCompleted {
                    round: rounds,
                    change_count: last_change_count,
                });
            }

            if last_change_count == 0 {
                return Ok(SyncSummary {
                    rounds,
                    total_changes,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let config = ConvergenceConfig::from(&SyncSettings { max_rounds: Some(3) });
        assert_eq!(config.max_rounds, Some(3));
        assert_eq!(ConvergenceConfig::default().max_rounds, None);
        assert_eq!(ConvergenceConfig::default().with_max_rounds(7).max_rounds, Some(7));
    }

    #[tokio::test]
    async fn test_no_sync_collaborators_converges_in_one_round() {
        let summary = ConvergenceLoop::new(ConvergenceConfig::default())
            .sync_until_stable(&[])
            .await
            .unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                rounds: 1,
                total_changes: 0
            }
        );
    }
}
