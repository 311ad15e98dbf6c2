//! Phase-by-phase fan-out of one operation across collaborators.
//!
//! A run starts with the default phase for every collaborator. Each
//! collaborator may answer with follow-up phases; those later than the
//! phase being processed are queued for that collaborator. Phases are
//! dispatched lowest label first, and every call of a phase returns before
//! the next phase starts.

use events::{Event, EventBus};
use futures::FutureExt;
use multiverse_core::{DispatchResult, Phase};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::collaborator::SharedCollaborator;
use crate::error::{AggregateDispatchError, CollaboratorError, DispatchFailure};
use crate::phase_queue::PhaseQueue;

/// One phase step of a run: the phase and who it was dispatched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStep {
    pub phase: Phase,
    pub collaborators: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CollaboratorResult {
    pub collaborator: String,
    pub phase: Phase,
    pub result: DispatchResult,
}

/// Everything a successful run did.
#[derive(Debug, Clone, Default)]
pub struct PhaseRun {
    pub steps: Vec<PhaseStep>,
    pub results: Vec<CollaboratorResult>,
}

impl PhaseRun {
    pub fn visited_phases(&self) -> Vec<Phase> {
        self.steps.iter().map(|s| s.phase.clone()).collect()
    }

    /// Sum of reported change counts across every phase of the run.
    pub fn total_changes(&self) -> i64 {
        self.results.iter().map(|r| r.result.changes()).sum()
    }
}

type CallOutcome = (String, Result<DispatchResult, CollaboratorError>);

pub struct PhaseDispatcher {
    operation: String,
    event_bus: Option<EventBus>,
}

impl PhaseDispatcher {
    /// `operation` names the run in logs, events and errors.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Dispatch `call` to `collaborators` until no phases remain.
    ///
    /// A step with any failure stops the run once all of its calls have
    /// returned; follow-up phases from the step's successful calls are still
    /// merged and reported in the error's `pending_phases`.
    pub async fn run_phases<F, Fut>(
        &self,
        collaborators: &[SharedCollaborator],
        call: F,
    ) -> Result<PhaseRun, AggregateDispatchError>
    where
        F: Fn(SharedCollaborator, Phase) -> Fut,
        Fut: Future<Output = Result<DispatchResult, CollaboratorError>> + Send + 'static,
    {
        let mut queue = PhaseQueue::new();
        let mut run = PhaseRun::default();

        while let Some((phase, assignment)) = queue.pop_lowest() {
            let selected: Vec<SharedCollaborator> = collaborators
                .iter()
                .filter(|c| assignment.includes(c.name()))
                .cloned()
                .collect();
            let names: Vec<String> = selected.iter().map(|c| c.name().to_string()).collect();

            info!(
                operation = %self.operation,
                phase = %phase,
                collaborators = ?names,
                "Dispatching phase"
            );
            self.emit(Event::PhaseStarted {
                operation: self.operation.clone(),
                phase: phase.as_str().to_string(),
                collaborators: names.clone(),
            });

            let outcomes = Self::fan_out(&selected, &phase, &call).await;

            let mut failures = Vec::new();
            for (name, outcome) in outcomes {
                match outcome {
                    Ok(result) if result.success => {
                        let honored = queue.request(&phase, &name, &result.phases);
                        if honored > 0 {
                            debug!(collaborator = %name, phase = %phase, honored, "Follow-up phases scheduled");
                        }
                        run.results.push(CollaboratorResult {
                            collaborator: name,
                            phase: phase.clone(),
                            result,
                        });
                    }
                    Ok(result) => failures.push(DispatchFailure {
                        phase: phase.clone(),
                        error: CollaboratorError::Application {
                            collaborator: name.clone(),
                            message: result.message,
                            trace: result.trace,
                        },
                        collaborator: name,
                    }),
                    Err(error) => failures.push(DispatchFailure {
                        collaborator: name,
                        phase: phase.clone(),
                        error,
                    }),
                }
            }

            self.emit(Event::PhaseCompleted {
                operation: self.operation.clone(),
                phase: phase.as_str().to_string(),
                failures: failures.len(),
            });
            run.steps.push(PhaseStep {
                phase: phase.clone(),
                collaborators: names,
            });

            if !failures.is_empty() {
                for failure in &failures {
                    error!(
                        operation = %self.operation,
                        phase = %phase,
                        collaborator = %failure.collaborator,
                        error = %failure.error,
                        "Collaborator call failed"
                    );
                }
                return Err(AggregateDispatchError {
                    operation: self.operation.clone(),
                    phase,
                    failures,
                    pending_phases: queue.phases(),
                });
            }
        }

        Ok(run)
    }

    /// Run one call per collaborator concurrently and wait for all of them.
    async fn fan_out<F, Fut>(
        selected: &[SharedCollaborator],
        phase: &Phase,
        call: &F,
    ) -> Vec<CallOutcome>
    where
        F: Fn(SharedCollaborator, Phase) -> Fut,
        Fut: Future<Output = Result<DispatchResult, CollaboratorError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(selected.len());
        for collaborator in selected {
            let name = collaborator.name().to_string();
            let pending = call(Arc::clone(collaborator), phase.clone());
            let task_name = name.clone();
            let handle = tasks.spawn(async move {
                let outcome = AssertUnwindSafe(pending)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(CollaboratorError::Panicked {
                            collaborator: task_name.clone(),
                            reason: panic_message(panic.as_ref()),
                        })
                    });
                (task_name, outcome)
            });
            names.insert(handle.id(), name);
        }

        let mut outcomes = Vec::with_capacity(selected.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => outcomes.push(outcome),
                Err(join_error) => outcomes.push(join_failure(&names, join_error)),
            }
        }
        outcomes
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}

/// Tasks are never aborted here, so a join error means runtime shutdown.
fn join_failure(names: &HashMap<Id, String>, join_error: JoinError) -> CallOutcome {
    let name = names
        .get(&join_error.id())
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_string());
    error!(collaborator = %name, error = %join_error, "Dispatch task did not complete");
    (
        name.clone(),
        Err(CollaboratorError::Panicked {
            collaborator: name,
            reason: join_error.to_string(),
        }),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
