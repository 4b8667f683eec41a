use serde::{Deserialize, Serialize};

use crate::task_type::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Balanced,
    SuperSaver,
    FastDelivery,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Balanced
    }
}

/// Why a particular model was recommended (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationReason {
    Primary,
    FallbackQuota,
    CapabilityMatch,
    NoQuotaWarning,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationReason::Primary => "primary",
            RecommendationReason::FallbackQuota => "fallback:quota",
            RecommendationReason::CapabilityMatch => "capability-match",
            RecommendationReason::NoQuotaWarning => "no-quota-warning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedModel {
    pub model_id: String,
    pub provider: String,
    pub reason: RecommendationReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub story_id: String,
    pub task_type: TaskType,
    pub recommended_model: RecommendedModel,
    pub confidence: f64,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub mode: ExecutionMode,
    pub stories: Vec<Allocation>,
}

impl ExecutionPlan {
    pub fn total_estimated_cost_usd(&self) -> f64 {
        self.stories.iter().map(|a| a.estimated_cost_usd).sum()
    }
}
