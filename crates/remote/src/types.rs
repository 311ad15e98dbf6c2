use serde::{Deserialize, Serialize};

/// Form body sent with every lifecycle and sync call.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseForm<'a> {
    pub phase: &'a str,
}

/// Shape of an error body; collaborators answer failures with the same
/// envelope they use for results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}
