use std::collections::HashSet;
use std::sync::OnceLock;

use ralph_types::{Capability, Model, ANTHROPIC_FAMILY};

pub const OPENAI: &str = "openai";
pub const DEEPSEEK: &str = "deepseek";
pub const GOOGLE: &str = "google";
pub const OPENROUTER: &str = "openrouter";
pub const LOCAL: &str = "local";

pub const CLAUDE_OPUS: &str = "claude-opus-4";
pub const CLAUDE_SONNET: &str = "claude-sonnet-4";
pub const CLAUDE_HAIKU: &str = "claude-haiku-4";
pub const GPT_PREMIUM: &str = "gpt-4.1";
pub const GPT_CHEAP: &str = "gpt-4.1-mini";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";
pub const GEMINI_FLASH: &str = "gemini-1.5-flash";
pub const GEMINI_PRO: &str = "gemini-1.5-pro";
pub const QWEN_CODER: &str = "qwen-2.5-coder";
pub const LOCAL_CODELLAMA: &str = "codellama-local";
pub const LOCAL_QWEN_CODER: &str = "qwen-coder-local";

/// Declared order of providers, used as the tie-break rank for the
/// capability-match fallback (spec.md §9 open question: "lower provider
/// rank, then id lexical").
pub const PROVIDER_RANK: &[&str] = &[ANTHROPIC_FAMILY, OPENAI, GOOGLE, DEEPSEEK, OPENROUTER, LOCAL];

pub fn provider_rank(provider: &str) -> usize {
    PROVIDER_RANK
        .iter()
        .position(|p| *p == provider)
        .unwrap_or(PROVIDER_RANK.len())
}

fn caps(list: &[Capability]) -> HashSet<Capability> {
    list.iter().copied().collect()
}

fn model(
    id: &str,
    provider: &str,
    input_price_per_m: f64,
    output_price_per_m: f64,
    context_window: u64,
    capabilities: &[Capability],
) -> Model {
    Model {
        id: id.to_string(),
        provider: provider.to_string(),
        input_price_per_m,
        output_price_per_m,
        context_window,
        capabilities: caps(capabilities),
    }
}

/// Process-global, read-only-after-init Model Catalog (spec.md §6 "Model
/// catalog"). Eleven entries, pricing taken verbatim from spec.md §6's
/// ordered (in,out) list.
fn build_catalog() -> Vec<Model> {
    use Capability::*;
    vec![
        // Opus-class (Anthropic-family)
        model(
            CLAUDE_OPUS,
            ANTHROPIC_FAMILY,
            15.0,
            75.0,
            200_000,
            &[DeepReasoning, CodeGeneration, StructuredOutput, LongContext],
        ),
        // Sonnet-class (Anthropic-family)
        model(
            CLAUDE_SONNET,
            ANTHROPIC_FAMILY,
            3.0,
            15.0,
            200_000,
            &[DeepReasoning, CodeGeneration, StructuredOutput],
        ),
        // Haiku-class (Anthropic-family)
        model(
            CLAUDE_HAIKU,
            ANTHROPIC_FAMILY,
            0.25,
            1.25,
            200_000,
            &[Fast, Cheap, CodeGeneration],
        ),
        // general-purpose premium
        model(
            GPT_PREMIUM,
            OPENAI,
            2.5,
            10.0,
            128_000,
            &[DeepReasoning, StructuredOutput, Multimodal],
        ),
        // general-purpose cheap
        model(
            GPT_CHEAP,
            OPENAI,
            0.15,
            0.60,
            128_000,
            &[Fast, Cheap, StructuredOutput],
        ),
        // reasoning-oriented cheap
        model(
            DEEPSEEK_REASONER,
            DEEPSEEK,
            1.10,
            4.40,
            64_000,
            &[DeepReasoning, Mathematical, Cheap],
        ),
        // long-context fast
        model(
            GEMINI_FLASH,
            GOOGLE,
            0.10,
            0.40,
            1_000_000,
            &[LongContext, Fast, Cheap, Multimodal],
        ),
        // long-context premium
        model(
            GEMINI_PRO,
            GOOGLE,
            1.25,
            5.00,
            2_000_000,
            &[LongContext, DeepReasoning, Multimodal],
        ),
        // cheap code-specialized third-party
        model(
            QWEN_CODER,
            OPENROUTER,
            0.14,
            0.28,
            32_000,
            &[CodeGeneration, Cheap],
        ),
        // local, zero-cost, code-specialized
        model(
            LOCAL_CODELLAMA,
            LOCAL,
            0.0,
            0.0,
            16_000,
            &[CodeGeneration, Cheap, Fast],
        ),
        // local, zero-cost, code-specialized
        model(
            LOCAL_QWEN_CODER,
            LOCAL,
            0.0,
            0.0,
            32_000,
            &[CodeGeneration, Cheap],
        ),
    ]
}

static CATALOG: OnceLock<Vec<Model>> = OnceLock::new();

pub fn catalog() -> &'static [Model] {
    CATALOG.get_or_init(build_catalog)
}

pub fn get_model(id: &str) -> Option<&'static Model> {
    catalog().iter().find(|m| m.id == id)
}

pub fn models_by_capability(cap: Capability) -> Vec<&'static Model> {
    catalog().iter().filter(|m| m.has_capability(cap)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_eleven_entries_with_spec_pricing() {
        let models = catalog();
        assert_eq!(models.len(), 11);
        let prices: Vec<(f64, f64)> = models
            .iter()
            .map(|m| (m.input_price_per_m, m.output_price_per_m))
            .collect();
        assert_eq!(
            prices,
            vec![
                (15.0, 75.0),
                (3.0, 15.0),
                (0.25, 1.25),
                (2.5, 10.0),
                (0.15, 0.60),
                (1.10, 4.40),
                (0.10, 0.40),
                (1.25, 5.00),
                (0.14, 0.28),
                (0.0, 0.0),
                (0.0, 0.0),
            ]
        );
    }

    #[test]
    fn local_models_are_free() {
        assert!(get_model(LOCAL_CODELLAMA).unwrap().is_free());
        assert!(get_model(LOCAL_QWEN_CODER).unwrap().is_free());
    }

    #[test]
    fn provider_rank_orders_anthropic_first() {
        assert_eq!(provider_rank(ANTHROPIC_FAMILY), 0);
        assert!(provider_rank(LOCAL) > provider_rank(OPENAI));
    }
}
