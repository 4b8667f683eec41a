use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use ralph_types::{Capability, ExecutionMode, Quota, QuotaStatus, RecommendationReason, RecommendedModel, TaskType};

use crate::catalog::{self, provider_rank};

#[derive(Debug, Clone, Copy)]
struct ModePair {
    primary: &'static str,
    fallback: &'static str,
}

type ModeTable = HashMap<TaskType, ModePair>;

fn pair(primary: &'static str, fallback: &'static str) -> ModePair {
    ModePair { primary, fallback }
}

/// Declares the three mode tables (spec.md §4.4): task-type → `{primary,
/// fallback}`. Values are chosen to reflect each mode's stated bias
/// (`balanced` = moderate default, `super-saver` = cheap/fast,
/// `fast-delivery` = top-tier for complex/unknown) rather than pulled from
/// any single source.
fn build_balanced() -> ModeTable {
    use catalog::*;
    use TaskType::*;
    HashMap::from([
        (ComplexIntegration, pair(CLAUDE_SONNET, GPT_PREMIUM)),
        (Mathematical, pair(DEEPSEEK_REASONER, CLAUDE_SONNET)),
        (BackendApi, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (BackendLogic, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (FrontendUi, pair(GPT_CHEAP, CLAUDE_HAIKU)),
        (FrontendLogic, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Database, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Testing, pair(CLAUDE_HAIKU, GPT_CHEAP)),
        (Documentation, pair(CLAUDE_HAIKU, GEMINI_FLASH)),
        (Refactoring, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Bugfix, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Devops, pair(GPT_CHEAP, CLAUDE_HAIKU)),
        (Config, pair(CLAUDE_HAIKU, GEMINI_FLASH)),
        (Unknown, pair(CLAUDE_SONNET, GPT_CHEAP)),
    ])
}

fn build_super_saver() -> ModeTable {
    use catalog::*;
    use TaskType::*;
    HashMap::from([
        (ComplexIntegration, pair(QWEN_CODER, LOCAL_CODELLAMA)),
        (Mathematical, pair(DEEPSEEK_REASONER, GPT_CHEAP)),
        (BackendApi, pair(GPT_CHEAP, QWEN_CODER)),
        (BackendLogic, pair(GPT_CHEAP, QWEN_CODER)),
        (FrontendUi, pair(CLAUDE_HAIKU, LOCAL_CODELLAMA)),
        (FrontendLogic, pair(GPT_CHEAP, LOCAL_QWEN_CODER)),
        (Database, pair(GPT_CHEAP, QWEN_CODER)),
        (Testing, pair(LOCAL_CODELLAMA, CLAUDE_HAIKU)),
        (Documentation, pair(GEMINI_FLASH, CLAUDE_HAIKU)),
        (Refactoring, pair(QWEN_CODER, LOCAL_QWEN_CODER)),
        (Bugfix, pair(CLAUDE_HAIKU, GPT_CHEAP)),
        (Devops, pair(GPT_CHEAP, LOCAL_CODELLAMA)),
        (Config, pair(GEMINI_FLASH, CLAUDE_HAIKU)),
        (Unknown, pair(GPT_CHEAP, QWEN_CODER)),
    ])
}

fn build_fast_delivery() -> ModeTable {
    use catalog::*;
    use TaskType::*;
    HashMap::from([
        (ComplexIntegration, pair(CLAUDE_OPUS, CLAUDE_SONNET)),
        (Mathematical, pair(CLAUDE_OPUS, DEEPSEEK_REASONER)),
        (BackendApi, pair(CLAUDE_SONNET, CLAUDE_OPUS)),
        (BackendLogic, pair(CLAUDE_SONNET, CLAUDE_OPUS)),
        (FrontendUi, pair(CLAUDE_SONNET, GPT_PREMIUM)),
        (FrontendLogic, pair(CLAUDE_SONNET, GPT_PREMIUM)),
        (Database, pair(CLAUDE_SONNET, CLAUDE_OPUS)),
        (Testing, pair(CLAUDE_SONNET, GPT_PREMIUM)),
        (Documentation, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Refactoring, pair(CLAUDE_SONNET, CLAUDE_OPUS)),
        (Bugfix, pair(CLAUDE_OPUS, CLAUDE_SONNET)),
        (Devops, pair(CLAUDE_SONNET, GPT_PREMIUM)),
        (Config, pair(CLAUDE_SONNET, GPT_CHEAP)),
        (Unknown, pair(CLAUDE_OPUS, CLAUDE_SONNET)),
    ])
}

static BALANCED: OnceLock<ModeTable> = OnceLock::new();
static SUPER_SAVER: OnceLock<ModeTable> = OnceLock::new();
static FAST_DELIVERY: OnceLock<ModeTable> = OnceLock::new();

fn table_for(mode: ExecutionMode) -> &'static ModeTable {
    match mode {
        ExecutionMode::Balanced => BALANCED.get_or_init(build_balanced),
        ExecutionMode::SuperSaver => SUPER_SAVER.get_or_init(build_super_saver),
        ExecutionMode::FastDelivery => FAST_DELIVERY.get_or_init(build_fast_delivery),
    }
}

/// The minimum capability a task genuinely needs, independent of mode or
/// which specific model currently fills the `primary` slot. This is the
/// "primary's declared requirements" spec.md §4.4 refers to for the
/// capability-match scan — modeled as one required tag per task type rather
/// than the full capability set of whichever model happens to be primary,
/// so an over-qualified primary (e.g. Opus-class, which also carries
/// deep-reasoning and long-context) doesn't block a cheaper model that
/// satisfies the task's actual need from being found by the scan.
fn required_capability(task_type: TaskType) -> Capability {
    use Capability::*;
    use TaskType::*;
    match task_type {
        ComplexIntegration => CodeGeneration,
        Mathematical => Mathematical,
        BackendApi | BackendLogic | Database | Refactoring | Bugfix => CodeGeneration,
        FrontendUi => CodeGeneration,
        FrontendLogic => CodeGeneration,
        Testing => CodeGeneration,
        Documentation => Fast,
        Devops => CodeGeneration,
        Config => Fast,
        Unknown => CodeGeneration,
    }
}

fn usable(quotas: &HashMap<String, Quota>, provider: &str) -> bool {
    quotas
        .get(provider)
        .map(|q| q.status.is_usable())
        .unwrap_or(false)
}

/// `GetRecommendedModel(taskType, mode, quotas) -> {modelId, provider,
/// reason}` (spec.md §4.4). Falls through primary → fallback →
/// capability-match scan → primary-with-warning, in that order.
pub fn get_recommended_model(
    task_type: TaskType,
    mode: ExecutionMode,
    quotas: &HashMap<String, Quota>,
) -> RecommendedModel {
    let table = table_for(mode);
    let ModePair { primary, fallback } = table
        .get(&task_type)
        .copied()
        .unwrap_or_else(|| table[&TaskType::Unknown]);

    if let Some(model) = catalog::get_model(primary) {
        if usable(quotas, &model.provider) {
            return RecommendedModel {
                model_id: model.id.clone(),
                provider: model.provider.clone(),
                reason: RecommendationReason::Primary,
            };
        }
    }

    if let Some(model) = catalog::get_model(fallback) {
        if usable(quotas, &model.provider) {
            return RecommendedModel {
                model_id: model.id.clone(),
                provider: model.provider.clone(),
                reason: RecommendationReason::FallbackQuota,
            };
        }
    }

    let required: HashSet<Capability> = HashSet::from([required_capability(task_type)]);
    let candidates: Vec<_> = catalog::catalog()
        .iter()
        .filter(|m| m.is_superset_of(&required))
        .filter(|m| usable(quotas, &m.provider))
        .collect();
    if let Some(cheapest) = pick_cheapest(&candidates) {
        return RecommendedModel {
            model_id: cheapest.id.clone(),
            provider: cheapest.provider.clone(),
            reason: RecommendationReason::CapabilityMatch,
        };
    }

    let (model_id, provider) = catalog::get_model(primary)
        .map(|m| (m.id.clone(), m.provider.clone()))
        .unwrap_or_else(|| (primary.to_string(), "unknown".to_string()));
    RecommendedModel {
        model_id,
        provider,
        reason: RecommendationReason::NoQuotaWarning,
    }
}

/// Deterministic tie-breaker for the capability-match scan (spec.md §9 open
/// question): cheapest total price first, then lower provider rank, then
/// model id lexical order.
fn pick_cheapest<'a>(candidates: &[&'a ralph_types::Model]) -> Option<&'a ralph_types::Model> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| {
            let cost_a = a.input_price_per_m + a.output_price_per_m;
            let cost_b = b.input_price_per_m + b.output_price_per_m;
            cost_a
                .partial_cmp(&cost_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| provider_rank(&a.provider).cmp(&provider_rank(&b.provider)))
                .then_with(|| a.id.cmp(&b.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(provider: &str, status: QuotaStatus) -> Quota {
        Quota {
            provider: provider.to_string(),
            status,
            remaining: None,
            reset_at: None,
            details: String::new(),
        }
    }

    #[test]
    fn primary_wins_when_available() {
        let quotas = HashMap::from([("anthropic".to_string(), quota("anthropic", QuotaStatus::Available))]);
        let rec = get_recommended_model(TaskType::BackendApi, ExecutionMode::Balanced, &quotas);
        assert_eq!(rec.reason, RecommendationReason::Primary);
        assert_eq!(rec.provider, "anthropic");
    }

    #[test]
    fn falls_back_to_capability_match_when_both_exhausted() {
        // S5: Anthropic primary+fallback both exhausted; scan surfaces a
        // cheap code-specialized third-party model whose provider is
        // available, with reason "capability-match".
        let quotas = HashMap::from([
            ("anthropic".to_string(), quota("anthropic", QuotaStatus::Exhausted)),
            ("openrouter".to_string(), quota("openrouter", QuotaStatus::Available)),
        ]);
        let rec = get_recommended_model(TaskType::Bugfix, ExecutionMode::FastDelivery, &quotas);
        assert_eq!(rec.reason, RecommendationReason::CapabilityMatch);
        assert_eq!(rec.provider, "openrouter");
    }

    #[test]
    fn no_quota_warning_when_nothing_usable() {
        let quotas = HashMap::new();
        let rec = get_recommended_model(TaskType::Unknown, ExecutionMode::Balanced, &quotas);
        assert_eq!(rec.reason, RecommendationReason::NoQuotaWarning);
    }

    #[test]
    fn capability_scan_tie_break_prefers_cheapest_then_provider_rank() {
        let quotas = HashMap::from([
            ("anthropic".to_string(), quota("anthropic", QuotaStatus::Exhausted)),
            ("openai".to_string(), quota("openai", QuotaStatus::Exhausted)),
            ("local".to_string(), quota("local", QuotaStatus::Available)),
        ]);
        let rec = get_recommended_model(TaskType::Testing, ExecutionMode::Balanced, &quotas);
        assert_eq!(rec.reason, RecommendationReason::CapabilityMatch);
        assert_eq!(rec.provider, "local");
    }
}
