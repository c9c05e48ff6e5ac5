use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One "step entered/completed" callback from the workflow engine.
///
/// Ephemeral: never persisted, treated as untrusted input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNotification {
    pub step_identifier: String,
    pub run_id: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

impl StepNotification {
    pub fn new(step_identifier: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            step_identifier: step_identifier.into(),
            run_id: run_id.into(),
            execution_id: None,
            variables: HashMap::new(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}
