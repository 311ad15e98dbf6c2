use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Couldn't perform {action} on {app}: {source}")]
    Request {
        app: String,
        action: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse response from {app} as JSON: {source}\n{body}")]
    Serialization {
        app: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Error fetching {url} on {app}:\n{message}\n{}", .trace.as_deref().unwrap_or("no trace available"))]
    Application {
        app: String,
        url: String,
        message: String,
        trace: Option<String>,
    },

    #[error("Invalid response from {app}: status {status}: {body}")]
    InvalidResponse {
        app: String,
        status: u16,
        body: String,
    },

    #[error("{app} does not provide {capability}")]
    NotSupported {
        app: String,
        capability: &'static str,
    },

    #[error("Invalid URL for {action} on {app}: {reason}")]
    InvalidUrl {
        app: String,
        action: String,
        reason: String,
    },
}

impl RemoteError {
    /// Whether the collaborator could not be reached at all, as opposed to
    /// answering with a failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    pub fn app(&self) -> &str {
        match self {
            Self::Request { app, .. }
            | Self::Serialization { app, .. }
            | Self::Application { app, .. }
            | Self::InvalidResponse { app, .. }
            | Self::NotSupported { app, .. }
            | Self::InvalidUrl { app, .. } => app,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
