use std::collections::HashMap;
use std::time::{Duration, Instant};

use ralph_core::EventBus;
use ralph_types::{Capability, EngineEvent, Model, Quota, QuotaStatus};

use crate::catalog;
use crate::probe::{default_probes, ProviderProbe};

/// TTL for a full quota snapshot (spec.md §3/§4.2).
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedSnapshot {
    quotas: HashMap<String, Quota>,
    fetched_at: Instant,
}

/// Holds the static Model Catalog and the mutable `provider -> Quota` map
/// (spec.md §4.2). Grounded on the teacher's `ProviderRegistry`
/// (`tandem-providers::lib`), narrowed from a chat-completion dispatcher to a
/// read-mostly quota cache with a TTL-guarded refresh.
pub struct QuotaManager {
    probes: Vec<Box<dyn ProviderProbe>>,
    bus: EventBus,
    snapshot: tokio::sync::RwLock<Option<CachedSnapshot>>,
}

impl QuotaManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            probes: default_probes(),
            bus,
            snapshot: tokio::sync::RwLock::new(None),
        }
    }

    pub fn with_probes(bus: EventBus, probes: Vec<Box<dyn ProviderProbe>>) -> Self {
        Self {
            probes,
            bus,
            snapshot: tokio::sync::RwLock::new(None),
        }
    }

    /// Returns a frozen copy of the current quota snapshot without probing,
    /// refreshing first only if no snapshot has ever been taken. Plan
    /// regeneration relies on this to see a consistent view (spec.md §5).
    pub async fn snapshot(&self) -> HashMap<String, Quota> {
        if let Some(cached) = self.snapshot.read().await.as_ref() {
            return cached.quotas.clone();
        }
        self.refresh(false).await
    }

    /// `Refresh(force?) -> snapshot`: probes each provider unless a live
    /// snapshot is younger than [`SNAPSHOT_TTL`] and `force` is false.
    pub async fn refresh(&self, force: bool) -> HashMap<String, Quota> {
        if !force {
            if let Some(cached) = self.snapshot.read().await.as_ref() {
                if cached.fetched_at.elapsed() < SNAPSHOT_TTL {
                    return cached.quotas.clone();
                }
            }
        }

        let previous = self
            .snapshot
            .read()
            .await
            .as_ref()
            .map(|c| c.quotas.clone())
            .unwrap_or_default();

        let mut quotas = HashMap::with_capacity(self.probes.len());
        for probe in &self.probes {
            let quota = tokio::time::timeout(probe.probe_timeout(), probe.detect())
                .await
                .unwrap_or_else(|_| Quota::unknown(probe.provider_id(), "probe timed out"));
            quotas.insert(probe.provider_id().to_string(), quota);
        }

        *self.snapshot.write().await = Some(CachedSnapshot {
            quotas: quotas.clone(),
            fetched_at: Instant::now(),
        });

        self.emit_transition_events(&previous, &quotas);
        quotas
    }

    fn emit_transition_events(
        &self,
        previous: &HashMap<String, Quota>,
        current: &HashMap<String, Quota>,
    ) {
        let changed = previous.len() != current.len()
            || current.iter().any(|(provider, quota)| {
                previous
                    .get(provider)
                    .map(|p| p.status != quota.status)
                    .unwrap_or(true)
            });
        if changed {
            self.bus.emit(EngineEvent::QuotaUpdate {
                quotas: current.values().cloned().collect(),
                timestamp: chrono::Utc::now(),
            });
        }
        for (provider, quota) in current {
            let was_warning = previous.get(provider).map(|p| p.status.is_warning()).unwrap_or(false);
            if quota.status.is_warning() && !was_warning {
                self.bus.emit(EngineEvent::QuotaWarning {
                    provider: provider.clone(),
                    details: quota.details.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }

    pub fn get_model_info(&self, id: &str) -> Option<&'static Model> {
        catalog::get_model(id)
    }

    pub fn models_by_capability(&self, cap: Capability) -> Vec<&'static Model> {
        catalog::models_by_capability(cap)
    }

    /// `EstimateCost(modelId, inTok, outTok) -> USD` (spec.md §4.2, §4.6
    /// "free-tier providers return 0").
    pub fn estimate_cost(&self, model_id: &str, in_tokens: u64, out_tokens: u64) -> f64 {
        let Some(model) = catalog::get_model(model_id) else {
            return 0.0;
        };
        if model.is_free() {
            return 0.0;
        }
        (in_tokens as f64 / 1_000_000.0) * model.input_price_per_m
            + (out_tokens as f64 / 1_000_000.0) * model.output_price_per_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ralph_core::EventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubProbe {
        id: &'static str,
        status: QuotaStatus,
    }

    #[async_trait]
    impl ProviderProbe for StubProbe {
        fn provider_id(&self) -> &'static str {
            self.id
        }
        fn has_identifier(&self) -> bool {
            true
        }
        async fn probe(&self) -> Option<anyhow::Result<crate::probe::ProbeReading>> {
            None
        }
        async fn detect(&self) -> Quota {
            Quota {
                provider: self.id.to_string(),
                status: self.status,
                remaining: None,
                reset_at: None,
                details: "stub".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn refresh_caches_within_ttl() {
        let bus = EventBus::new();
        let manager = QuotaManager::with_probes(
            bus,
            vec![Box::new(StubProbe {
                id: "anthropic",
                status: QuotaStatus::Available,
            })],
        );
        let first = manager.refresh(false).await;
        let second = manager.refresh(false).await;
        assert_eq!(first.get("anthropic").unwrap().status, second.get("anthropic").unwrap().status);
    }

    #[tokio::test]
    async fn estimate_cost_is_zero_for_free_models() {
        let bus = EventBus::new();
        let manager = QuotaManager::new(bus);
        let cost = manager.estimate_cost(catalog::LOCAL_CODELLAMA, 100_000, 50_000);
        assert_eq!(cost, 0.0);
    }

    #[tokio::test]
    async fn estimate_cost_matches_catalog_pricing() {
        let bus = EventBus::new();
        let manager = QuotaManager::new(bus);
        let cost = manager.estimate_cost(catalog::CLAUDE_SONNET, 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn crossing_into_limited_emits_quota_warning() {
        let bus = EventBus::new();
        let warnings = Arc::new(AtomicUsize::new(0));
        let counted = warnings.clone();
        bus.on("quota_warning", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        let manager = QuotaManager::with_probes(
            bus,
            vec![Box::new(StubProbe {
                id: "anthropic",
                status: QuotaStatus::Limited,
            })],
        );
        manager.refresh(true).await;
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }
}
