use std::collections::HashMap;

use ralph_quota::capability::get_recommended_model;
use ralph_quota::manager::QuotaManager;
use ralph_types::{
    Allocation, Complexity, ExecutionMode, ExecutionPlan, ModelLearning, Prd, Quota, TaskType,
};

use crate::task_detector::detect_task_type;

/// Per-complexity token estimate table (spec.md §4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

pub fn token_estimate(complexity: Complexity) -> TokenEstimate {
    match complexity {
        Complexity::Simple => TokenEstimate {
            input_tokens: 5_000,
            output_tokens: 2_000,
        },
        Complexity::Medium => TokenEstimate {
            input_tokens: 15_000,
            output_tokens: 6_000,
        },
        Complexity::Complex => TokenEstimate {
            input_tokens: 40_000,
            output_tokens: 15_000,
        },
    }
}

/// Bonus added to confidence for prior experience with a (model, task type)
/// pair (spec.md §4.5 step 5).
fn experience_bonus(total_runs: u32) -> f64 {
    if total_runs >= 10 {
        0.05
    } else if total_runs >= 5 {
        0.03
    } else if total_runs >= 3 {
        0.01
    } else {
        0.0
    }
}

/// Queried by the planner to fold learning history into confidence (spec.md
/// §4.5 step 5). Implemented by `ralph-tracking::LearningRecorder`; kept as a
/// trait here rather than a direct dependency so `ralph-planner` stays ahead
/// of `ralph-tracking` in the dependency order spec.md §2 declares.
pub trait LearningLookup {
    fn lookup(&self, provider: &str, model_id: &str, task_type: TaskType) -> Option<ModelLearning>;
}

fn confidence_for(learning: Option<&ModelLearning>) -> f64 {
    let Some(learning) = learning else {
        return 0.5;
    };
    let base = 0.5
        + (learning.overall_score / 100.0) * 0.35
        + learning.success_rate * 0.1
        + experience_bonus(learning.total_runs);
    base.clamp(0.5, 1.0)
}

/// `GeneratePlan(PRD, quotas, mode, learning?) -> ExecutionPlan` (spec.md
/// §4.5). Produces one [`Allocation`] per non-passing, non-skipped story, in
/// PRD declaration order.
pub fn generate_plan(
    prd: &Prd,
    quotas: &HashMap<String, Quota>,
    mode: ExecutionMode,
    learning: Option<&dyn LearningLookup>,
) -> ExecutionPlan {
    let stories = prd
        .user_stories
        .iter()
        .filter(|s| !s.passes && !s.is_skipped())
        .map(|story| {
            let task_type = detect_task_type(story);
            let estimate = token_estimate(story.complexity);
            let recommended = get_recommended_model(task_type, mode, quotas);
            let estimated_cost_usd = estimate_cost_for(
                &recommended.model_id,
                estimate.input_tokens,
                estimate.output_tokens,
            );
            let history = learning.and_then(|l| l.lookup(&recommended.provider, &recommended.model_id, task_type));
            let confidence = confidence_for(history.as_ref());

            Allocation {
                story_id: story.id.clone(),
                task_type,
                recommended_model: recommended,
                confidence,
                estimated_input_tokens: estimate.input_tokens,
                estimated_output_tokens: estimate.output_tokens,
                estimated_cost_usd,
            }
        })
        .collect();

    ExecutionPlan { mode, stories }
}

/// `generate_plan` wired to a live [`QuotaManager`] for cost estimation,
/// rather than a bare catalog lookup. Used by `ralph-engine`'s planner step.
pub async fn generate_plan_with_manager(
    prd: &Prd,
    quota_manager: &QuotaManager,
    mode: ExecutionMode,
    learning: Option<&dyn LearningLookup>,
) -> ExecutionPlan {
    let quotas = quota_manager.snapshot().await;
    generate_plan(prd, &quotas, mode, learning)
}

fn estimate_cost_for(model_id: &str, in_tokens: u64, out_tokens: u64) -> f64 {
    let Some(model) = ralph_quota::catalog::get_model(model_id) else {
        return 0.0;
    };
    if model.is_free() {
        return 0.0;
    }
    (in_tokens as f64 / 1_000_000.0) * model.input_price_per_m
        + (out_tokens as f64 / 1_000_000.0) * model.output_price_per_m
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_types::{AcceptanceCriteria, QuotaStatus, UserStory};

    fn prd_with_one_story(complexity: Complexity) -> Prd {
        Prd {
            project: "demo".into(),
            description: "d".into(),
            branch_name: "ralph/demo".into(),
            cli: None,
            cli_fallback_order: None,
            user_stories: vec![UserStory {
                id: "US-001".into(),
                title: "Fix the login bug".into(),
                description: "There is a crash on login".into(),
                acceptance_criteria: AcceptanceCriteria::Text(vec!["login works".into()]),
                complexity,
                priority: 1,
                passes: false,
                skipped: None,
            }],
        }
    }

    fn available_quotas() -> HashMap<String, Quota> {
        HashMap::from([(
            "anthropic".to_string(),
            Quota {
                provider: "anthropic".into(),
                status: QuotaStatus::Available,
                remaining: None,
                reset_at: None,
                details: String::new(),
            },
        )])
    }

    #[test]
    fn generates_one_allocation_per_open_story() {
        let prd = prd_with_one_story(Complexity::Simple);
        let quotas = available_quotas();
        let plan = generate_plan(&prd, &quotas, ExecutionMode::Balanced, None);
        assert_eq!(plan.stories.len(), 1);
        assert_eq!(plan.stories[0].task_type, TaskType::Bugfix);
        assert_eq!(plan.stories[0].estimated_input_tokens, 5_000);
        assert_eq!(plan.stories[0].confidence, 0.5);
    }

    #[test]
    fn skips_passing_and_skipped_stories() {
        let mut prd = prd_with_one_story(Complexity::Simple);
        prd.user_stories[0].passes = true;
        let plan = generate_plan(&prd, &available_quotas(), ExecutionMode::Balanced, None);
        assert!(plan.stories.is_empty());
    }

    #[test]
    fn token_estimates_follow_complexity_table() {
        assert_eq!(
            token_estimate(Complexity::Medium),
            TokenEstimate {
                input_tokens: 15_000,
                output_tokens: 6_000
            }
        );
        assert_eq!(
            token_estimate(Complexity::Complex),
            TokenEstimate {
                input_tokens: 40_000,
                output_tokens: 15_000
            }
        );
    }

    struct StubLearning(ModelLearning);
    impl LearningLookup for StubLearning {
        fn lookup(&self, _provider: &str, _model_id: &str, _task_type: TaskType) -> Option<ModelLearning> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn confidence_rises_with_learning_history() {
        let prd = prd_with_one_story(Complexity::Simple);
        let learning = StubLearning(ModelLearning {
            total_runs: 12,
            successful_runs: 11,
            success_rate: 0.9,
            avg_duration_minutes: 5.0,
            avg_cost_usd: 0.1,
            avg_tokens: 1000.0,
            avg_ac_pass_rate: 0.95,
            efficiency_score: 80.0,
            speed_score: 70.0,
            reliability_score: 85.0,
            overall_score: 80.0,
        });
        let plan = generate_plan(
            &prd,
            &available_quotas(),
            ExecutionMode::Balanced,
            Some(&learning),
        );
        let confidence = plan.stories[0].confidence;
        assert!(confidence > 0.5);
        assert!(confidence <= 1.0);
        // 0.5 + 0.8*0.35 + 0.9*0.1 + 0.05 = 0.5 + 0.28 + 0.09 + 0.05 = 0.92
        assert!((confidence - 0.92).abs() < 1e-9);
    }
}
