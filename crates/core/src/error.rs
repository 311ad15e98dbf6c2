use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to read topology config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse topology config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid URI for {context}: {uri} ({reason})")]
    InvalidUri {
        context: String,
        uri: String,
        reason: String,
    },

    #[error("No configuration for endpoints.{host} (requested {uri})")]
    EndpointNotConfigured { host: String, uri: String },

    #[error("Unknown lifecycle operation: {0}")]
    UnknownLifecycleOp(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
