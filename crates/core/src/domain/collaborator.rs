use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Something a collaborator can be asked to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Exposes a status probe for the readiness barrier
    Status,
    /// Accepts before/after lifecycle operations
    LifecycleOps,
    /// Accepts synchronization rounds
    Sync,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::LifecycleOps => "lifecycle",
            Self::Sync => "sync",
        }
    }
}

/// The subset of [`Capability`] a collaborator exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub status: bool,
    pub lifecycle_ops: bool,
    pub sync: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            status: true,
            lifecycle_ops: true,
            sync: true,
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Status => self.status = true,
            Capability::LifecycleOps => self.lifecycle_ops = true,
            Capability::Sync => self.sync = true,
        }
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Status => self.status,
            Capability::LifecycleOps => self.lifecycle_ops,
            Capability::Sync => self.sync,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        [Capability::Status, Capability::LifecycleOps, Capability::Sync]
            .into_iter()
            .filter(|c| self.contains(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::none(), |caps, c| caps.with(c))
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|c| c.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// A collaborator as described by the topology configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorInfo {
    pub name: String,
    pub status_url: Option<Url>,
    pub test_support_url: Option<Url>,
}

impl CollaboratorInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_url: None,
            test_support_url: None,
        }
    }

    pub fn with_status_url(mut self, url: Url) -> Self {
        self.status_url = Some(url);
        self
    }

    pub fn with_test_support_url(mut self, url: Url) -> Self {
        self.test_support_url = Some(url);
        self
    }

    /// A status URL grants the probe; a test support URL grants both
    /// lifecycle operations and sync.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::none();
        if self.status_url.is_some() {
            caps = caps.with(Capability::Status);
        }
        if self.test_support_url.is_some() {
            caps = caps
                .with(Capability::LifecycleOps)
                .with(Capability::Sync);
        }
        caps
    }
}
