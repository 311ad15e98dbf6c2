//! Ordered queue of pending phases and the collaborators scheduled for each.

use multiverse_core::Phase;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Which collaborators a queued phase applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Every collaborator passed to the run; only used by the default phase
    All,
    /// The collaborators that requested the phase
    Only(BTreeSet<String>),
}

impl Assignment {
    pub fn includes(&self, collaborator: &str) -> bool {
        match self {
            Assignment::All => true,
            Assignment::Only(names) => names.contains(collaborator),
        }
    }
}

/// Phases waiting to be dispatched, drained lowest label first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseQueue {
    entries: BTreeMap<Phase, Assignment>,
}

impl PhaseQueue {
    /// A queue holding only the default phase, assigned to everyone.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Phase::initial(), Assignment::All);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_more(&self) -> bool {
        !self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return the lowest phase.
    pub fn pop_lowest(&mut self) -> Option<(Phase, Assignment)> {
        self.entries.pop_first()
    }

    pub fn get(&self, phase: &Phase) -> Option<&Assignment> {
        self.entries.get(phase)
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.entries.keys().cloned().collect()
    }

    /// Add `collaborator` to `phase`, creating the entry if needed.
    pub fn schedule(&mut self, phase: Phase, collaborator: &str) {
        match self
            .entries
            .entry(phase)
            .or_insert_with(|| Assignment::Only(BTreeSet::new()))
        {
            Assignment::All => {}
            Assignment::Only(names) => {
                names.insert(collaborator.to_string());
            }
        }
    }

    /// Merge the follow-up phases `collaborator` asked for while `current`
    /// was being processed. Requests for `current` or anything before it
    /// are dropped. Returns how many requests were honored.
    pub fn request<'a, I>(&mut self, current: &Phase, collaborator: &str, requested: I) -> usize
    where
        I: IntoIterator<Item = &'a Phase>,
    {
        let mut honored = 0;
        for phase in requested {
            if phase.follows(current) {
                self.schedule(phase.clone(), collaborator);
                honored += 1;
            } else {
                debug!(
                    collaborator,
                    current = %current,
                    requested = %phase,
                    "Ignoring request for a phase that is not after the current one"
                );
            }
        }
        honored
    }
}

impl Default for PhaseQueue {
    fn default() -> Self {
        Self::new()
    }
}
