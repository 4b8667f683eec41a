use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A label for a model strength, used to match task requirements against
/// catalog entries (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    DeepReasoning,
    Mathematical,
    CodeGeneration,
    StructuredOutput,
    Creative,
    LongContext,
    Multimodal,
    Fast,
    Cheap,
}

/// Upstream service serving a model. Kept as a plain identifier (not a
/// closed enum) so new providers can be added to the catalog without an API
/// break, mirroring the teacher's `ProviderRegistry`'s string-keyed provider
/// ids (`tandem-providers::ProviderInfo`).
pub type ProviderId = String;

/// Static catalog entry (§6 "Model catalog"). The catalog itself is
/// process-global, read-only after initialization (spec.md §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider: ProviderId,
    pub input_price_per_m: f64,
    pub output_price_per_m: f64,
    pub context_window: u64,
    pub capabilities: HashSet<Capability>,
}

impl Model {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn is_superset_of(&self, required: &HashSet<Capability>) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn is_free(&self) -> bool {
        self.input_price_per_m == 0.0 && self.output_price_per_m == 0.0
    }
}

/// "Anthropic-family" is the one provider the engine treats specially when
/// mapping a recommendation onto a CLI invocation (spec.md §4.8 step 5).
pub const ANTHROPIC_FAMILY: &str = "anthropic";
