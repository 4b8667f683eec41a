use std::path::Path;

use async_trait::async_trait;

/// Multiplexer session lifecycle (spec.md §4.8 step 9, §9 "Ownership of
/// multiplexer and subprocess resources"). Grounded on the teacher's
/// `ralph/service.rs` use of `std::process::Command` for git state capture,
/// generalized to session creation/kill/keystroke-injection so the rest of
/// the engine depends on a trait rather than shelling out directly.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn exists(&self, name: &str) -> anyhow::Result<bool>;
    async fn create(&self, name: &str, cwd: &Path) -> anyhow::Result<()>;
    async fn send_keys(&self, name: &str, command: &str) -> anyhow::Result<()>;
    async fn kill(&self, name: &str) -> anyhow::Result<()>;
    async fn is_alive(&self, name: &str) -> bool;
}

/// Default `tmux`-backed implementation (spec.md §4.8 "the spec's
/// 'terminal-multiplexer' is not named further; tmux is the conventional
/// choice"). Creation/destruction is idempotent (spec.md §5 "pre-checks
/// existence and kills if present before creating").
pub struct TmuxSessionBackend;

impl TmuxSessionBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TmuxSessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for TmuxSessionBackend {
    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        let status = tokio::process::Command::new("tmux")
            .args(["has-session", "-t", name])
            .status()
            .await?;
        Ok(status.success())
    }

    async fn create(&self, name: &str, cwd: &Path) -> anyhow::Result<()> {
        if self.exists(name).await.unwrap_or(false) {
            self.kill(name).await?;
        }
        let status = tokio::process::Command::new("tmux")
            .args(["new-session", "-d", "-s", name, "-c"])
            .arg(cwd)
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("tmux new-session failed for {name}");
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, command: &str) -> anyhow::Result<()> {
        let status = tokio::process::Command::new("tmux")
            .args(["send-keys", "-t", name, command, "Enter"])
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("tmux send-keys failed for {name}");
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> anyhow::Result<()> {
        let _ = tokio::process::Command::new("tmux")
            .args(["kill-session", "-t", name])
            .status()
            .await;
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> bool {
        self.exists(name).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSessionBackend;

    #[tokio::test]
    async fn fake_backend_create_then_kill_is_idempotent() {
        let backend = FakeSessionBackend::default();
        backend.create("ralph-demo", Path::new("/tmp")).await.unwrap();
        assert!(backend.is_alive("ralph-demo").await);
        backend.kill("ralph-demo").await.unwrap();
        assert!(!backend.is_alive("ralph-demo").await);
        backend.kill("ralph-demo").await.unwrap();
    }
}
