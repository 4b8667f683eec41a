use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use ralph_types::{Prd, ANTHROPIC_FAMILY};
use tokio::sync::Mutex;

/// Built-in CLI identifiers in declared fallback order (spec.md §9 open
/// question: "the canonical order is the built-in sequence above").
pub const BUILT_IN_ORDER: &[&str] = &["anthropic", "generic", "codex", "gemini", "aider", "cody"];

pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
pub const HEALTH_CHECK_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Maps a CLI identifier onto the actual executable name invoked inside the
/// multiplexer session (spec.md §4.8 step 5/6, §6 "External CLI contract").
pub fn cli_binary(cli_id: &str) -> &'static str {
    match cli_id {
        "anthropic" => "claude",
        "codex" => "codex",
        "gemini" => "gemini",
        "aider" => "aider",
        "cody" => "cody",
        _ => "llm",
    }
}

/// `provider -> CLI` mapping (spec.md §4.8 step 5: "if provider is the
/// Anthropic-family, use the Anthropic-family CLI... else use the generic
/// CLI with a provider-prefixed model string").
pub fn cli_for_provider(provider: &str) -> &'static str {
    if provider == ANTHROPIC_FAMILY {
        "anthropic"
    } else {
        "generic"
    }
}

/// Builds the argv the Engine sends as keystrokes into the multiplexer
/// session (spec.md §4.8 step 8/9: prompt is passed by file reference, not
/// argument content).
pub fn build_command(
    cli_id: &str,
    model_id: &str,
    provider: &str,
    prompt_path: &Path,
    resume_token: Option<&str>,
) -> Vec<String> {
    let binary = cli_binary(cli_id).to_string();
    let model_flag = if cli_id == "anthropic" {
        model_id.to_string()
    } else {
        format!("{provider}/{model_id}")
    };
    let mut argv = vec![
        binary,
        "--model".to_string(),
        model_flag,
        "--prompt-file".to_string(),
        prompt_path.display().to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
    ];
    if let Some(token) = resume_token {
        argv.push("--resume".to_string());
        argv.push(token.to_string());
    }
    argv
}

struct CachedHealth {
    healthy: bool,
    checked_at: Instant,
}

/// Plain keyed cache with absolute expiry (spec.md §9 "Health-check cache":
/// "never amortize retries across cache hits").
pub struct CliHealthCache {
    entries: Mutex<HashMap<String, CachedHealth>>,
}

impl CliHealthCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `<binary> --version` with a 3 s timeout, caching the result for
    /// [`HEALTH_CHECK_CACHE_TTL`] (spec.md §4.8 step 6).
    pub async fn is_healthy(&self, cli_id: &str) -> bool {
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(cli_id) {
                if cached.checked_at.elapsed() < HEALTH_CHECK_CACHE_TTL {
                    return cached.healthy;
                }
            }
        }

        let healthy = check_health(cli_id).await;
        self.entries.lock().await.insert(
            cli_id.to_string(),
            CachedHealth {
                healthy,
                checked_at: Instant::now(),
            },
        );
        healthy
    }

    /// Pre-seeds a cache entry as healthy without running `--version`, so
    /// callers that have already verified a CLI through another channel (or
    /// tests standing in for a CLI binary the machine doesn't have) can skip
    /// the process spawn.
    pub async fn seed_healthy(&self, cli_id: &str) {
        self.entries.lock().await.insert(
            cli_id.to_string(),
            CachedHealth {
                healthy: true,
                checked_at: Instant::now(),
            },
        );
    }
}

impl Default for CliHealthCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_health(cli_id: &str) -> bool {
    let binary = cli_binary(cli_id);
    let result = tokio::time::timeout(
        HEALTH_CHECK_TIMEOUT,
        tokio::process::Command::new(binary).arg("--version").output(),
    )
    .await;
    matches!(result, Ok(Ok(output)) if output.status.success())
}

/// Builds the CLI fallback chain in spec.md §4.8 step 6 order: project-level
/// override, project fallback list, global preferred, global fallback list,
/// then the built-in order — deduplicated, first occurrence wins (spec.md §9
/// open question: "fallback lists are consulted *before* the built-in
/// scan").
pub fn fallback_chain(
    prd: &Prd,
    global_preferred: Option<&str>,
    global_fallback_order: Option<&[String]>,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut push_unique = |id: &str, chain: &mut Vec<String>| {
        if !chain.iter().any(|existing: &String| existing == id) {
            chain.push(id.to_string());
        }
    };

    if let Some(cli) = &prd.cli {
        push_unique(cli, &mut chain);
    }
    if let Some(list) = &prd.cli_fallback_order {
        for id in list {
            push_unique(id, &mut chain);
        }
    }
    if let Some(preferred) = global_preferred {
        push_unique(preferred, &mut chain);
    }
    if let Some(list) = global_fallback_order {
        for id in list {
            push_unique(id, &mut chain);
        }
    }
    for id in BUILT_IN_ORDER {
        push_unique(id, &mut chain);
    }
    chain
}

/// First CLI in `chain` that passes a health check, or `None` if every
/// candidate is unhealthy (spec.md §4.8 step 6: "no healthy CLI ⇒ fatal
/// error").
pub async fn resolve_healthy_cli(chain: &[String], cache: &CliHealthCache) -> Option<String> {
    for id in chain {
        if cache.is_healthy(id).await {
            return Some(id.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prd(cli: Option<&str>, fallback: Option<Vec<&str>>) -> Prd {
        Prd {
            project: "demo".into(),
            description: "d".into(),
            branch_name: "ralph/demo".into(),
            cli: cli.map(|s| s.to_string()),
            cli_fallback_order: fallback.map(|v| v.into_iter().map(|s| s.to_string()).collect()),
            user_stories: Vec::new(),
        }
    }

    #[test]
    fn fallback_chain_orders_project_then_global_then_builtin() {
        let prd = sample_prd(Some("codex"), Some(vec!["gemini"]));
        let chain = fallback_chain(&prd, Some("aider"), Some(&["cody".to_string()]));
        assert_eq!(
            chain,
            vec!["codex", "gemini", "aider", "cody", "anthropic", "generic"]
        );
    }

    #[test]
    fn fallback_chain_dedupes_first_occurrence_wins() {
        let prd = sample_prd(Some("anthropic"), None);
        let chain = fallback_chain(&prd, None, None);
        assert_eq!(chain[0], "anthropic");
        assert_eq!(chain.iter().filter(|id| *id == "anthropic").count(), 1);
    }

    #[test]
    fn build_command_uses_bare_model_for_anthropic_and_prefixed_for_generic() {
        let path = Path::new("/tmp/prompt-1.md");
        let anthropic_cmd = build_command("anthropic", "claude-sonnet-4", "anthropic", path, None);
        assert!(anthropic_cmd.contains(&"claude-sonnet-4".to_string()));

        let generic_cmd = build_command("generic", "gpt-4.1-mini", "openai", path, Some("tok-1"));
        assert!(generic_cmd.contains(&"openai/gpt-4.1-mini".to_string()));
        assert!(generic_cmd.contains(&"--resume".to_string()));
    }
}
