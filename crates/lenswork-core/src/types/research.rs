//! Deep-research job types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Research job lifecycle state as reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ResearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchStatus::Completed | ResearchStatus::Failed | ResearchStatus::Canceled
        )
    }
}

/// Output of a finished research job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutput {
    /// Free-text answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Structured answer when an output schema was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

/// A deep-research job owned by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchJob {
    pub id: String,
    pub status: ResearchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ResearchOutput>,
}

impl ResearchJob {
    /// Best available result: structured output when present, else text.
    pub fn result_value(&self) -> Option<Value> {
        let output = self.output.as_ref()?;
        if let Some(parsed) = &output.parsed {
            return Some(parsed.clone());
        }
        output.content.as_ref().map(|c| Value::String(c.clone()))
    }
}
