use std::time::Duration;

use async_trait::async_trait;
use ralph_types::quota::{Quota, QuotaStatus};

use crate::catalog::{DEEPSEEK, GOOGLE, LOCAL, OPENAI, OPENROUTER};
use ralph_types::ANTHROPIC_FAMILY;

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("x") || trimmed.eq_ignore_ascii_case("placeholder")
}

/// Resolves the credential env var for a provider (spec.md §6 "Environment
/// variables recognized"). Grounded on the teacher's
/// `tandem-providers::env_api_key_for_provider`.
pub fn env_credential(provider: &str) -> Option<String> {
    let env_name = match provider {
        ANTHROPIC_FAMILY => "ANTHROPIC_API_KEY",
        OPENAI => "OPENAI_API_KEY",
        OPENROUTER => "OPENROUTER_API_KEY",
        GOOGLE => "GOOGLE_API_KEY",
        _ => return None,
    };
    let value = std::env::var(env_name).ok()?;
    if is_placeholder(&value) {
        return None;
    }
    Some(value)
}

fn google_credential() -> Option<String> {
    env_credential(GOOGLE).or_else(|| {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|v| !is_placeholder(v))
    })
}

/// One polymorphic detection strategy per provider (spec.md §4.2): an
/// identifier source plus an optional live probe. Grounded on the teacher's
/// `Provider` trait shape (`tandem-providers::Provider`), narrowed from "chat
/// completion" to "quota probe."
#[async_trait]
pub trait ProviderProbe: Send + Sync {
    fn provider_id(&self) -> &'static str;

    /// Returns `true` if a credential source (env var, keychain entry, known
    /// file, or "always on" for local providers) exists.
    fn has_identifier(&self) -> bool;

    /// Live probe timeout, 2-10s per spec.md §4.2/§5.
    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Executes the live probe, if this provider defines one. `None` means
    /// "no probe defined" (identifier alone ⇒ available, per spec.md §4.2).
    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>>;

    async fn detect(&self) -> Quota {
        if !self.has_identifier() {
            return Quota::unavailable(self.provider_id());
        }
        match self.probe().await {
            None => Quota {
                provider: self.provider_id().to_string(),
                status: QuotaStatus::Available,
                remaining: None,
                reset_at: None,
                details: "credential present, no live probe defined".to_string(),
            },
            Some(Ok(reading)) => reading.into_quota(self.provider_id()),
            Some(Err(err)) => Quota::unknown(self.provider_id(), format!("probe failed: {err}")),
        }
    }
}

/// Normalized result of a successful live probe.
pub struct ProbeReading {
    pub utilization_pct: Option<f64>,
    pub remaining: Option<f64>,
    pub details: String,
}

impl ProbeReading {
    fn into_quota(self, provider: &str) -> Quota {
        let status = match self.utilization_pct {
            Some(pct) if pct > 95.0 => QuotaStatus::Exhausted,
            Some(pct) if pct > 80.0 => QuotaStatus::Limited,
            _ => QuotaStatus::Available,
        };
        Quota {
            provider: provider.to_string(),
            status,
            remaining: self.remaining,
            reset_at: None,
            details: self.details,
        }
    }
}

pub struct AnthropicProbe {
    client: reqwest::Client,
}

impl AnthropicProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderProbe for AnthropicProbe {
    fn provider_id(&self) -> &'static str {
        ANTHROPIC_FAMILY
    }

    fn has_identifier(&self) -> bool {
        env_credential(ANTHROPIC_FAMILY).is_some()
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        let key = env_credential(ANTHROPIC_FAMILY)?;
        Some(probe_credits_endpoint(
            &self.client,
            "https://api.anthropic.com/v1/organizations/usage",
            |req| req.header("x-api-key", &key).header("anthropic-version", "2023-06-01"),
            self.probe_timeout(),
        )
        .await)
    }
}

pub struct OpenAiProbe {
    client: reqwest::Client,
}

impl OpenAiProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderProbe for OpenAiProbe {
    fn provider_id(&self) -> &'static str {
        OPENAI
    }

    fn has_identifier(&self) -> bool {
        env_credential(OPENAI).is_some()
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        let key = env_credential(OPENAI)?;
        Some(
            probe_credits_endpoint(
                &self.client,
                "https://api.openai.com/v1/dashboard/billing/usage",
                |req| req.bearer_auth(&key),
                self.probe_timeout(),
            )
            .await,
        )
    }
}

pub struct OpenRouterProbe {
    client: reqwest::Client,
}

impl OpenRouterProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderProbe for OpenRouterProbe {
    fn provider_id(&self) -> &'static str {
        OPENROUTER
    }

    fn has_identifier(&self) -> bool {
        env_credential(OPENROUTER).is_some()
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        let key = env_credential(OPENROUTER)?;
        Some(
            probe_credits_endpoint(
                &self.client,
                "https://openrouter.ai/api/v1/auth/key",
                |req| req.bearer_auth(&key),
                self.probe_timeout(),
            )
            .await,
        )
    }
}

/// Google has a credential but no implemented live usage probe — identifier
/// alone yields `available`, per spec.md §4.2's "if the identifier exists
/// but no probe is defined" rule.
pub struct GoogleProbe;

#[async_trait]
impl ProviderProbe for GoogleProbe {
    fn provider_id(&self) -> &'static str {
        GOOGLE
    }

    fn has_identifier(&self) -> bool {
        google_credential().is_some()
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        None
    }
}

/// DeepSeek (reasoning-oriented cheap) has no dedicated credential variable
/// in spec.md §6; it is reached through the OpenRouter credential when
/// present, otherwise treated as unavailable.
pub struct DeepSeekProbe;

#[async_trait]
impl ProviderProbe for DeepSeekProbe {
    fn provider_id(&self) -> &'static str {
        DEEPSEEK
    }

    fn has_identifier(&self) -> bool {
        env_credential(OPENROUTER).is_some()
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        None
    }
}

/// Local, zero-cost models are always `available` — there is no quota to
/// exhaust (spec.md §6 "local-zero-cost" catalog entries).
pub struct LocalProbe;

#[async_trait]
impl ProviderProbe for LocalProbe {
    fn provider_id(&self) -> &'static str {
        LOCAL
    }

    fn has_identifier(&self) -> bool {
        true
    }

    async fn probe(&self) -> Option<anyhow::Result<ProbeReading>> {
        None
    }
}

async fn probe_credits_endpoint(
    client: &reqwest::Client,
    url: &str,
    configure: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    timeout: Duration,
) -> anyhow::Result<ProbeReading> {
    let request = configure(client.get(url)).timeout(timeout);
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("probe returned HTTP {status}");
    }
    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    let utilization_pct = body
        .get("utilization_pct")
        .or_else(|| body.get("usage_percent"))
        .and_then(|v| v.as_f64());
    let remaining = body
        .get("remaining")
        .or_else(|| body.get("limit_remaining"))
        .and_then(|v| v.as_f64());
    Ok(ProbeReading {
        utilization_pct,
        remaining,
        details: format!("probed {url} ({status})"),
    })
}

pub fn default_probes() -> Vec<Box<dyn ProviderProbe>> {
    let client = reqwest::Client::new();
    vec![
        Box::new(AnthropicProbe::new(client.clone())),
        Box::new(OpenAiProbe::new(client.clone())),
        Box::new(OpenRouterProbe::new(client)),
        Box::new(GoogleProbe),
        Box::new(DeepSeekProbe),
        Box::new(LocalProbe),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_with_no_credential_is_unavailable() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let probe = AnthropicProbe::new(reqwest::Client::new());
        let quota = probe.detect().await;
        assert_eq!(quota.status, QuotaStatus::Unavailable);
    }

    #[tokio::test]
    async fn local_provider_is_always_available() {
        let quota = LocalProbe.detect().await;
        assert_eq!(quota.status, QuotaStatus::Available);
    }

    #[test]
    fn placeholder_credentials_are_rejected() {
        std::env::set_var("OPENAI_API_KEY", "placeholder");
        assert_eq!(env_credential(OPENAI), None);
        std::env::remove_var("OPENAI_API_KEY");
    }
}
