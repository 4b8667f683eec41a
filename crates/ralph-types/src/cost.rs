use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single story's cost lifecycle record, appended to on-disk history on
/// completion (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryExecutionRecord {
    pub story_id: String,
    pub model_id: String,
    pub provider: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl StoryExecutionRecord {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Aggregate view over the current session's cost records (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionCosts {
    pub total_estimated: f64,
    pub total_actual: f64,
    pub stories_completed: u32,
    pub stories_successful: u32,
    pub records: Vec<StoryExecutionRecord>,
}
