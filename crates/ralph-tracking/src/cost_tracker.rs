use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use ralph_types::{SessionCosts, StoryExecutionRecord};
use tokio::sync::RwLock;

/// Per-story cost lifecycle, session aggregates, and on-disk history
/// (spec.md §4.6). Persistence is a single JSON array at `cost_history_path`,
/// rewritten atomically on every `end_story` — logically append-only (no
/// record is ever edited or removed after it is written), following
/// `ralph-core`'s single-persistence-primitive convention rather than a raw
/// JSONL append, so every write goes through the same temp-file + rename
/// helper the PRD and progress files use (spec.md §8 property 1).
pub struct CostTracker {
    history_path: PathBuf,
    in_progress: RwLock<HashMap<String, StoryExecutionRecord>>,
    session: RwLock<SessionCosts>,
}

impl CostTracker {
    pub async fn load(history_path: PathBuf) -> Self {
        let records: Vec<StoryExecutionRecord> =
            ralph_core::read_json_or_default(&history_path).await;
        Self {
            history_path,
            in_progress: RwLock::new(HashMap::new()),
            session: RwLock::new(SessionCosts {
                records,
                ..Default::default()
            }),
        }
    }

    /// `StartStory(storyId, modelId, provider, estCost, retryCount)`
    /// (spec.md §4.6).
    pub async fn start_story(
        &self,
        story_id: impl Into<String>,
        model_id: impl Into<String>,
        provider: impl Into<String>,
        est_cost: f64,
        retry_count: u32,
    ) {
        let story_id = story_id.into();
        let record = StoryExecutionRecord {
            story_id: story_id.clone(),
            model_id: model_id.into(),
            provider: provider.into(),
            start_time: Utc::now(),
            end_time: None,
            estimated_cost: est_cost,
            actual_cost: None,
            input_tokens: None,
            output_tokens: None,
            retry_count,
            success: None,
        };
        self.in_progress.write().await.insert(story_id, record);
    }

    /// `EndStory(storyId, actualCost, inTok, outTok, success)` (spec.md
    /// §4.6). Finalizes the in-progress record and appends it to the
    /// on-disk history. No record ever has an `end_time` without an
    /// `actual_cost` (spec.md §8 property 4).
    pub async fn end_story(
        &self,
        story_id: &str,
        actual_cost: f64,
        input_tokens: u64,
        output_tokens: u64,
        success: bool,
    ) -> anyhow::Result<Option<StoryExecutionRecord>> {
        let Some(mut record) = self.in_progress.write().await.remove(story_id) else {
            return Ok(None);
        };
        record.end_time = Some(Utc::now());
        record.actual_cost = Some(actual_cost);
        record.input_tokens = Some(input_tokens);
        record.output_tokens = Some(output_tokens);
        record.success = Some(success);

        {
            let mut session = self.session.write().await;
            session.records.push(record.clone());
            session.stories_completed += 1;
            if success {
                session.stories_successful += 1;
            }
            session.total_estimated += record.estimated_cost;
            session.total_actual += actual_cost;
        }

        self.persist().await?;
        Ok(Some(record))
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let records = self.session.read().await.records.clone();
        ralph_core::atomic_write_json_durable(&self.history_path, &records).await
    }

    /// `GetSessionCosts()` (spec.md §4.6).
    pub async fn session_costs(&self) -> SessionCosts {
        self.session.read().await.clone()
    }

    pub async fn has_in_progress(&self, story_id: &str) -> bool {
        self.in_progress.read().await.contains_key(story_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_path(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ralph-tracking-cost-{name}-{ts}.json"))
    }

    #[tokio::test]
    async fn start_then_end_story_finalizes_and_persists() {
        let path = unique_path("roundtrip");
        let tracker = CostTracker::load(path.clone()).await;
        tracker
            .start_story("US-001", "claude-sonnet-4", "anthropic", 0.25, 0)
            .await;
        assert!(tracker.has_in_progress("US-001").await);

        let record = tracker
            .end_story("US-001", 0.3, 5000, 2000, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.actual_cost, Some(0.3));
        assert!(!tracker.has_in_progress("US-001").await);

        let reloaded = CostTracker::load(path.clone()).await;
        let costs = reloaded.session_costs().await;
        assert_eq!(costs.records.len(), 1);
        assert_eq!(costs.stories_completed, 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn ending_unknown_story_is_a_no_op() {
        let path = unique_path("unknown");
        let tracker = CostTracker::load(path.clone()).await;
        let result = tracker.end_story("missing", 0.1, 10, 10, true).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn session_aggregates_accumulate_across_stories() {
        let path = unique_path("aggregate");
        let tracker = CostTracker::load(path.clone()).await;
        tracker.start_story("US-001", "m", "p", 1.0, 0).await;
        tracker.end_story("US-001", 1.0, 100, 100, true).await.unwrap();
        tracker.start_story("US-002", "m", "p", 2.0, 1).await;
        tracker.end_story("US-002", 1.5, 100, 100, false).await.unwrap();

        let costs = tracker.session_costs().await;
        assert_eq!(costs.stories_completed, 2);
        assert_eq!(costs.stories_successful, 1);
        assert!((costs.total_estimated - 3.0).abs() < 1e-9);
        assert!((costs.total_actual - 2.5).abs() < 1e-9);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
