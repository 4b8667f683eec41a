use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;

use crate::session::SessionBackend;

/// In-memory stand-in for [`SessionBackend`], used by this crate's own tests
/// and by `ralph-engine/tests/` integration tests so neither requires a real
/// `tmux` binary on the test machine.
#[derive(Default, Clone)]
pub struct FakeSessionBackend {
    alive: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn exists(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.alive.lock().unwrap().iter().any(|n| n == name))
    }

    async fn create(&self, name: &str, _cwd: &Path) -> anyhow::Result<()> {
        let mut alive = self.alive.lock().unwrap();
        if !alive.iter().any(|n| n == name) {
            alive.push(name.to_string());
        }
        Ok(())
    }

    async fn send_keys(&self, _name: &str, _command: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn kill(&self, name: &str) -> anyhow::Result<()> {
        self.alive.lock().unwrap().retain(|n| n != name);
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> bool {
        self.alive.lock().unwrap().iter().any(|n| n == name)
    }
}
