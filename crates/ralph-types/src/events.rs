use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::AgentActivity;
use crate::plan::{ExecutionPlan, RecommendedModel};
use crate::progress::StoryProgress;
use crate::quota::Quota;

/// Append-only event taxonomy broadcast on the Event Bus (§4.1). Every
/// variant carries its own `timestamp` so subscribers can reconstruct
/// ordering even if delivery is buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    QuotaUpdate {
        quotas: Vec<Quota>,
        timestamp: DateTime<Utc>,
    },
    QuotaWarning {
        provider: String,
        details: String,
        timestamp: DateTime<Utc>,
    },
    PlanStarted {
        project: String,
        timestamp: DateTime<Utc>,
    },
    PlanReady {
        plan: ExecutionPlan,
        timestamp: DateTime<Utc>,
    },
    PlanFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionStarted {
        project: String,
        total_stories: usize,
        timestamp: DateTime<Utc>,
    },
    StoryStarted {
        story_id: String,
        model_id: String,
        provider: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StoryProgress {
        story_id: String,
        activity: AgentActivity,
        timestamp: DateTime<Utc>,
    },
    StoryCompleted {
        story_id: String,
        progress: StoryProgress,
        timestamp: DateTime<Utc>,
    },
    StoryFailed {
        story_id: String,
        reason: String,
        attempt: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    ExecutionPaused {
        story_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ExecutionResumed {
        story_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ExecutionStopped {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionComplete {
        project: String,
        stories_completed: u32,
        stories_successful: u32,
        timestamp: DateTime<Utc>,
    },
    LearningRecorded {
        story_id: String,
        model_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    RecommendationUpdated {
        story_id: String,
        recommended_model: RecommendedModel,
        timestamp: DateTime<Utc>,
    },
    StateSnapshot {
        state: String,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::QuotaUpdate { timestamp, .. }
            | EngineEvent::QuotaWarning { timestamp, .. }
            | EngineEvent::PlanStarted { timestamp, .. }
            | EngineEvent::PlanReady { timestamp, .. }
            | EngineEvent::PlanFailed { timestamp, .. }
            | EngineEvent::ExecutionStarted { timestamp, .. }
            | EngineEvent::StoryStarted { timestamp, .. }
            | EngineEvent::StoryProgress { timestamp, .. }
            | EngineEvent::StoryCompleted { timestamp, .. }
            | EngineEvent::StoryFailed { timestamp, .. }
            | EngineEvent::ExecutionPaused { timestamp, .. }
            | EngineEvent::ExecutionResumed { timestamp, .. }
            | EngineEvent::ExecutionStopped { timestamp, .. }
            | EngineEvent::ExecutionComplete { timestamp, .. }
            | EngineEvent::LearningRecorded { timestamp, .. }
            | EngineEvent::RecommendationUpdated { timestamp, .. }
            | EngineEvent::StateSnapshot { timestamp, .. } => *timestamp,
        }
    }

    /// The `type` discriminant as it serializes on the wire, for log
    /// filtering without a full deserialize.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::QuotaUpdate { .. } => "quota_update",
            EngineEvent::QuotaWarning { .. } => "quota_warning",
            EngineEvent::PlanStarted { .. } => "plan_started",
            EngineEvent::PlanReady { .. } => "plan_ready",
            EngineEvent::PlanFailed { .. } => "plan_failed",
            EngineEvent::ExecutionStarted { .. } => "execution_started",
            EngineEvent::StoryStarted { .. } => "story_started",
            EngineEvent::StoryProgress { .. } => "story_progress",
            EngineEvent::StoryCompleted { .. } => "story_completed",
            EngineEvent::StoryFailed { .. } => "story_failed",
            EngineEvent::ExecutionPaused { .. } => "execution_paused",
            EngineEvent::ExecutionResumed { .. } => "execution_resumed",
            EngineEvent::ExecutionStopped { .. } => "execution_stopped",
            EngineEvent::ExecutionComplete { .. } => "execution_complete",
            EngineEvent::LearningRecorded { .. } => "learning_recorded",
            EngineEvent::RecommendationUpdated { .. } => "recommendation_updated",
            EngineEvent::StateSnapshot { .. } => "state_snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let event = EngineEvent::PlanStarted {
            project: "demo".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
    }
}
