//! Result type returned by every action executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single action invocation.
///
/// `success == false` is an ordinary step failure, not an error of the
/// executor itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Failure without a message; the engine reports it as "Action failed".
    pub fn failed_silently() -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_constructors() {
        let ok = ActionOutcome::ok("done");
        assert!(ok.success);
        assert_eq!(ok.output, json!("done"));

        let failed = ActionOutcome::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.output.is_null());
    }

    #[test]
    fn test_outcome_deserialize_minimal() {
        let outcome: ActionOutcome = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_none());
    }
}
