use serde::{Deserialize, Deserializer, Serialize};

use super::Phase;

/// What one collaborator reported for one phase of a lifecycle or sync call.
///
/// This is also the JSON body collaborators answer with, so every field is
/// lenient on input: a missing or `null` `phases` list means no follow-up
/// phases were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_count: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phases: Vec<Phase>,
}

impl DispatchResult {
    /// A successful result with no follow-up phases.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_phases<I, P>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Phase>,
    {
        self.phases = phases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_change_count(mut self, change_count: i64) -> Self {
        self.change_count = Some(change_count);
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Change count for convergence purposes; absent counts as zero.
    pub fn changes(&self) -> i64 {
        self.change_count.unwrap_or(0)
    }
}

/// Body of a status probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

impl StatusReport {
    pub fn healthy() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_body() {
        let body = r#"{
            "success": true,
            "message": "seeded",
            "phases": ["phase2", "phase1"],
            "change_count": 3
        }"#;
        let result: DispatchResult = serde_json::from_str(body).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "seeded");
        assert_eq!(result.phases, vec![Phase::from("phase2"), Phase::from("phase1")]);
        assert_eq!(result.changes(), 3);
    }

    #[test]
    fn test_deserialize_null_phases() {
        let result: DispatchResult =
            serde_json::from_str(r#"{"success": true, "message": null, "phases": null}"#).unwrap();
        assert!(result.phases.is_empty());
        assert!(result.message.is_empty());
        assert_eq!(result.changes(), 0);
    }

    #[test]
    fn test_missing_success_is_failure() {
        let result: DispatchResult = serde_json::from_str(r#"{"message": "boom"}"#).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_builders() {
        let result = DispatchResult::ok()
            .with_phases(["phase1"])
            .with_change_count(2);
        assert!(result.success);
        assert_eq!(result.phases, vec![Phase::from("phase1")]);
        assert_eq!(result.change_count, Some(2));

        let failed = DispatchResult::failed("nope").with_trace("at line 1");
        assert!(!failed.success);
        assert_eq!(failed.trace.as_deref(), Some("at line 1"));
    }

    #[test]
    fn test_status_report() {
        let report: StatusReport = serde_json::from_str(r#"{"ok": false, "message": "migrating"}"#).unwrap();
        assert_eq!(report, StatusReport::unhealthy("migrating"));
        assert!(StatusReport::healthy().ok);
    }
}
