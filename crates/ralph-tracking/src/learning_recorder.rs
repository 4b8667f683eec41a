use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock as StdRwLock;

use ralph_core::EventBus;
use ralph_planner::LearningLookup;
use ralph_types::{EngineEvent, LearningKey, ModelLearning, ModelPerformanceRecord, TaskType};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AggregateEntry {
    key: LearningKey,
    learning: ModelLearning,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LearningDbFile {
    records: Vec<ModelPerformanceRecord>,
    aggregates: Vec<AggregateEntry>,
}

struct LearningState {
    records: Vec<ModelPerformanceRecord>,
    aggregates: HashMap<LearningKey, ModelLearning>,
}

fn clamp_score(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

/// Per-run scores (spec.md §4.7), computed once per [`ModelPerformanceRecord`]
/// before folding into the running aggregate.
struct RunScores {
    efficiency: f64,
    speed: f64,
    reliability: f64,
}

fn score_run(record: &ModelPerformanceRecord) -> RunScores {
    let efficiency = if record.cost_usd <= 0.0 {
        100.0
    } else {
        clamp_score((record.ac_pass_rate * 100.0) / (record.cost_usd * 100.0).max(EPSILON))
    };
    let speed = if record.duration_minutes <= 0.0 {
        100.0
    } else {
        clamp_score(100.0 / record.duration_minutes)
    };
    let success_weight = if record.success { 1.0 } else { 0.5 };
    let retry_penalty = (1.0 - 0.1 * record.retry_count as f64).max(0.0);
    let reliability = clamp_score(record.ac_pass_rate * 100.0 * success_weight * retry_penalty);

    RunScores {
        efficiency,
        speed,
        reliability,
    }
}

fn running_mean(old_mean: f64, new_value: f64, new_count: u32) -> f64 {
    old_mean + (new_value - old_mean) / new_count as f64
}

fn fold_into_aggregate(existing: Option<&ModelLearning>, record: &ModelPerformanceRecord) -> ModelLearning {
    let scores = score_run(record);
    let prior = existing.cloned().unwrap_or(ModelLearning {
        total_runs: 0,
        successful_runs: 0,
        success_rate: 0.0,
        avg_duration_minutes: 0.0,
        avg_cost_usd: 0.0,
        avg_tokens: 0.0,
        avg_ac_pass_rate: 0.0,
        efficiency_score: 0.0,
        speed_score: 0.0,
        reliability_score: 0.0,
        overall_score: 0.0,
    });

    let total_runs = prior.total_runs + 1;
    let successful_runs = prior.successful_runs + if record.success { 1 } else { 0 };
    let success_rate = successful_runs as f64 / total_runs as f64;

    let avg_duration_minutes = running_mean(prior.avg_duration_minutes, record.duration_minutes, total_runs);
    let avg_cost_usd = running_mean(prior.avg_cost_usd, record.cost_usd, total_runs);
    let avg_tokens = running_mean(prior.avg_tokens, record.total_tokens as f64, total_runs);
    let avg_ac_pass_rate = running_mean(prior.avg_ac_pass_rate, record.ac_pass_rate, total_runs);

    let efficiency_score = running_mean(prior.efficiency_score, scores.efficiency, total_runs);
    let speed_score = running_mean(prior.speed_score, scores.speed, total_runs);
    let reliability_score = running_mean(prior.reliability_score, scores.reliability, total_runs);

    let overall_score =
        clamp_score(0.4 * reliability_score + 0.35 * efficiency_score + 0.25 * speed_score);

    ModelLearning {
        total_runs,
        successful_runs,
        success_rate,
        avg_duration_minutes,
        avg_cost_usd,
        avg_tokens,
        avg_ac_pass_rate,
        efficiency_score,
        speed_score,
        reliability_score,
        overall_score,
    }
}

/// Records runs, scores and aggregates per (model, task-type), and answers
/// "best model for this task type" queries (spec.md §4.7). Grounded on the
/// teacher's `orchestrator/reducer.rs` scoring/aggregation style, persisted
/// through `ralph-core`'s atomic JSON helper like every other store in this
/// workspace.
///
/// Aggregates live in a synchronous [`std::sync::RwLock`] rather than
/// `tokio::sync::RwLock` so [`LearningLookup::lookup`] (consumed by
/// `ralph-planner`'s confidence calculation) can stay a plain, non-async
/// trait method.
pub struct LearningRecorder {
    path: PathBuf,
    bus: EventBus,
    state: StdRwLock<LearningState>,
}

impl LearningRecorder {
    pub async fn load(path: PathBuf, bus: EventBus) -> Self {
        let db: LearningDbFile = ralph_core::read_json_or_default(&path).await;
        let aggregates = db
            .aggregates
            .into_iter()
            .map(|entry| (entry.key, entry.learning))
            .collect();
        Self {
            path,
            bus,
            state: StdRwLock::new(LearningState {
                records: db.records,
                aggregates,
            }),
        }
    }

    /// `RecordRun(record)` (spec.md §4.7). Appends the immutable record,
    /// updates its aggregate, persists, and emits `learning-recorded` plus
    /// `recommendation-updated` when the best model for the task type
    /// changes.
    pub async fn record_run(&self, record: ModelPerformanceRecord) -> anyhow::Result<()> {
        let key = LearningKey::new(record.provider.clone(), record.model_id.clone(), record.task_type);
        let task_type = record.task_type;
        let before_best = self.best_model_locked(task_type, 3);

        let snapshot = {
            let mut state = self.state.write().expect("learning state lock poisoned");
            let updated = fold_into_aggregate(state.aggregates.get(&key), &record);
            state.aggregates.insert(key.clone(), updated);
            state.records.push(record.clone());
            LearningDbFile {
                records: state.records.clone(),
                aggregates: state
                    .aggregates
                    .iter()
                    .map(|(k, v)| AggregateEntry {
                        key: k.clone(),
                        learning: v.clone(),
                    })
                    .collect(),
            }
        };

        ralph_core::atomic_write_json_durable(&self.path, &snapshot).await?;

        self.bus.emit(EngineEvent::LearningRecorded {
            story_id: record.story_id.clone(),
            model_id: record.model_id.clone(),
            success: record.success,
            timestamp: chrono::Utc::now(),
        });

        let after_best = self.best_model_locked(task_type, 3);
        if after_best.as_ref().map(|b| &b.0) != before_best.as_ref().map(|b| &b.0) {
            if let Some((model_id, provider)) = after_best {
                self.bus.emit(EngineEvent::RecommendationUpdated {
                    story_id: record.story_id,
                    recommended_model: ralph_types::RecommendedModel {
                        model_id,
                        provider,
                        reason: ralph_types::RecommendationReason::Primary,
                    },
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        Ok(())
    }

    fn best_model_locked(&self, task_type: TaskType, min_runs: u32) -> Option<(String, String)> {
        let state = self.state.read().expect("learning state lock poisoned");
        state
            .aggregates
            .iter()
            .filter(|(k, v)| k.task_type == task_type && v.total_runs >= min_runs)
            .max_by(|(_, a), (_, b)| {
                a.overall_score
                    .partial_cmp(&b.overall_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(k, _)| (k.model_id.clone(), k.provider.clone()))
    }

    /// `GetBestModel(taskType, minRuns=3) -> {modelId, provider}?` (spec.md
    /// §4.7).
    pub fn get_best_model(&self, task_type: TaskType, min_runs: u32) -> Option<(String, String)> {
        self.best_model_locked(task_type, min_runs)
    }

    /// All learning for a task type, sorted by `overallScore` descending
    /// (supplement, SPEC_FULL.md §4.7 — a natural "list all" counterpart to
    /// `GetBestModel`'s "pick one").
    pub fn list_for_task_type(&self, task_type: TaskType) -> Vec<(LearningKey, ModelLearning)> {
        let state = self.state.read().expect("learning state lock poisoned");
        let mut entries: Vec<_> = state
            .aggregates
            .iter()
            .filter(|(k, _)| k.task_type == task_type)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(_, a), (_, b)| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }
}

impl LearningLookup for LearningRecorder {
    fn lookup(&self, provider: &str, model_id: &str, task_type: TaskType) -> Option<ModelLearning> {
        let key = LearningKey::new(provider.to_string(), model_id.to_string(), task_type);
        self.state
            .read()
            .expect("learning state lock poisoned")
            .aggregates
            .get(&key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_types::Complexity;

    fn unique_path(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ralph-tracking-learning-{name}-{ts}.json"))
    }

    fn record(success: bool, retry_count: u32, ac_pass_rate: f64) -> ModelPerformanceRecord {
        ModelPerformanceRecord {
            project: "demo".into(),
            story_id: "US-001".into(),
            story_title: "Fix bug".into(),
            task_type: TaskType::Bugfix,
            complexity: Complexity::Simple,
            provider: "anthropic".into(),
            model_id: "claude-sonnet-4".into(),
            duration_minutes: 2.0,
            input_tokens: 5000,
            output_tokens: 2000,
            total_tokens: 7000,
            cost_usd: 0.05,
            success,
            retry_count,
            ac_total: 1,
            ac_passed: if ac_pass_rate >= 1.0 { 1 } else { 0 },
            ac_pass_rate,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn invariants_hold_after_recording() {
        let path = unique_path("invariants");
        let bus = EventBus::new();
        let recorder = LearningRecorder::load(path.clone(), bus).await;
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        recorder.record_run(record(false, 1, 0.0)).await.unwrap();

        let learning = recorder
            .lookup("anthropic", "claude-sonnet-4", TaskType::Bugfix)
            .unwrap();
        assert_eq!(learning.total_runs, learning.successful_runs + learning.failed_runs());
        assert!(learning.avg_ac_pass_rate >= 0.0 && learning.avg_ac_pass_rate <= 1.0);
        assert!(learning.overall_score >= 0.0 && learning.overall_score <= 100.0);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn best_model_requires_minimum_runs() {
        let path = unique_path("min-runs");
        let bus = EventBus::new();
        let recorder = LearningRecorder::load(path.clone(), bus).await;
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        assert!(recorder.get_best_model(TaskType::Bugfix, 3).is_none());

        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        assert!(recorder.get_best_model(TaskType::Bugfix, 3).is_some());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn recommendation_updated_emitted_on_first_best_model() {
        let path = unique_path("recommendation");
        let bus = EventBus::new();
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = seen.clone();
        bus.on("recommendation_updated", move |_| {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let recorder = LearningRecorder::load(path.clone(), bus).await;
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 0);
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn persists_and_reloads_aggregates() {
        let path = unique_path("persist");
        let bus = EventBus::new();
        let recorder = LearningRecorder::load(path.clone(), bus.clone()).await;
        recorder.record_run(record(true, 0, 1.0)).await.unwrap();

        let reloaded = LearningRecorder::load(path.clone(), bus).await;
        let learning = reloaded
            .lookup("anthropic", "claude-sonnet-4", TaskType::Bugfix)
            .unwrap();
        assert_eq!(learning.total_runs, 1);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
