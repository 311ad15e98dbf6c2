//! Scripted in-process collaborators for driving the engine in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use multiverse_core::{Capabilities, DispatchResult, LifecycleOp, Phase, StatusReport};
use orchestrator::{Collaborator, CollaboratorError, SharedCollaborator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of calls, as `app:phase` with the default phase shown as
/// `--default--`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Compare against groups of entries whose order within a group is
    /// unspecified but whose groups must appear in sequence.
    pub fn assert_groups(&self, expected: &[&[&str]]) {
        let entries = self.entries();
        let mut rest = entries.as_slice();
        for group in expected {
            assert!(
                rest.len() >= group.len(),
                "log {:?} is missing group {:?}",
                entries,
                group
            );
            let (head, tail) = rest.split_at(group.len());
            let mut got: Vec<&str> = head.iter().map(String::as_str).collect();
            let mut want: Vec<&str> = group.to_vec();
            got.sort_unstable();
            want.sort_unstable();
            assert_eq!(got, want, "unexpected group in log {:?}", entries);
            rest = tail;
        }
        assert!(rest.is_empty(), "unexpected trailing calls {:?} in {:?}", rest, entries);
    }
}

type Script = Arc<dyn Fn(&str, &Phase) -> Result<DispatchResult, CollaboratorError> + Send + Sync>;

pub struct ScriptedApp {
    name: String,
    capabilities: Capabilities,
    log: CallLog,
    script: Script,
    delay: Duration,
    unhealthy_probes: usize,
    probes: AtomicUsize,
}

impl ScriptedApp {
    /// Succeeds everywhere and requests no further phases.
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities::all(),
            log: log.clone(),
            script: Arc::new(|_, _| Ok(DispatchResult::ok())),
            delay: Duration::ZERO,
            unhealthy_probes: 0,
            probes: AtomicUsize::new(0),
        }
    }

    /// Answer with follow-up phases looked up by `app:phase`.
    pub fn answering(mut self, answers: &[(&str, &[&str])]) -> Self {
        let answers: HashMap<String, Vec<String>> = answers
            .iter()
            .map(|(key, phases)| (key.to_string(), phases.iter().map(|p| p.to_string()).collect()))
            .collect();
        let name = self.name.clone();
        self.script = Arc::new(move |_, phase| {
            let key = format!("{}:{}", name, phase);
            let phases = answers.get(&key).cloned().unwrap_or_default();
            Ok(DispatchResult::ok().with_phases(phases))
        });
        self
    }

    pub fn scripted<F>(mut self, script: F) -> Self
    where
        F: Fn(&str, &Phase) -> Result<DispatchResult, CollaboratorError> + Send + Sync + 'static,
    {
        self.script = Arc::new(script);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report unhealthy for the first `probes` status checks.
    pub fn unhealthy_for(mut self, probes: usize) -> Self {
        self.unhealthy_probes = probes;
        self
    }

    pub fn shared(self) -> SharedCollaborator {
        Arc::new(self)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    async fn call(&self, action: &str, phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        self.log.push(format!("{}:{}", self.name, phase));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(action, phase)
    }
}

#[async_trait]
impl Collaborator for ScriptedApp {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn probe(&self) -> Result<StatusReport, CollaboratorError> {
        let seen = self.probes.fetch_add(1, Ordering::SeqCst);
        if seen < self.unhealthy_probes {
            Ok(StatusReport::unhealthy(format!("{} still starting", self.name)))
        } else {
            Ok(StatusReport::healthy())
        }
    }

    async fn invoke(&self, op: LifecycleOp, phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        self.call(op.as_str(), phase).await
    }

    async fn sync(&self, phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        self.call("sync", phase).await
    }
}

/// A collaborator that can never be reached.
pub struct Unreachable {
    pub name: String,
}

#[async_trait]
impl Collaborator for Unreachable {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn probe(&self) -> Result<StatusReport, CollaboratorError> {
        Err(CollaboratorError::transport(&self.name, "connection refused"))
    }

    async fn invoke(&self, _op: LifecycleOp, _phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        Err(CollaboratorError::transport(&self.name, "connection refused"))
    }

    async fn sync(&self, _phase: &Phase) -> Result<DispatchResult, CollaboratorError> {
        Err(CollaboratorError::transport(&self.name, "connection refused"))
    }
}
