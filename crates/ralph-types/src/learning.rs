use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prd::Complexity;
use crate::task_type::TaskType;

/// Immutable per-run record (§3, §4.7). Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformanceRecord {
    pub project: String,
    pub story_id: String,
    pub story_title: String,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub provider: String,
    pub model_id: String,
    pub duration_minutes: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub success: bool,
    pub retry_count: u32,
    pub ac_total: u32,
    pub ac_passed: u32,
    pub ac_pass_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated performance for one (provider:modelId, taskType) pair (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLearning {
    pub total_runs: u32,
    pub successful_runs: u32,
    pub success_rate: f64,
    pub avg_duration_minutes: f64,
    pub avg_cost_usd: f64,
    pub avg_tokens: f64,
    pub avg_ac_pass_rate: f64,
    pub efficiency_score: f64,
    pub speed_score: f64,
    pub reliability_score: f64,
    pub overall_score: f64,
}

impl ModelLearning {
    pub fn failed_runs(&self) -> u32 {
        self.total_runs.saturating_sub(self.successful_runs)
    }
}

/// Key under which a `ModelLearning` aggregate is stored: `provider:modelId`
/// crossed with task type (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearningKey {
    pub provider: String,
    pub model_id: String,
    pub task_type: TaskType,
}

impl LearningKey {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            task_type,
        }
    }

    pub fn model_key(&self) -> String {
        format!("{}:{}", self.provider, self.model_id)
    }
}
