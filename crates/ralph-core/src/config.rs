use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::atomic::{atomic_write_json, read_json_or_default};
use crate::paths::settings_path;
use ralph_types::ExecutionMode;

/// A project the desktop/TUI shell has open. Opaque to the core (spec.md §1
/// treats the UI as an external collaborator); kept here only because it is
/// a persisted settings field (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenProject {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentProject {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub last_accessed: DateTime<Utc>,
}

/// Cached result of a coarse upstream status probe (e.g. status.anthropic.com),
/// consulted by the Engine's API-health launch gate (spec.md §4.8 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCache {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Recognized settings (spec.md §6 "Settings options"). Unknown fields
/// round-trip through `extra` rather than being dropped, so a newer UI build
/// sharing this config file with an older engine binary doesn't lose data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub notification_sound: bool,
    #[serde(default)]
    pub open_projects: Vec<OpenProject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_project_path: Option<String>,
    #[serde(default)]
    pub recent_projects: Vec<RecentProject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_cli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_fallback_order: Option<Vec<String>>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_status_cache: Option<StatusCache>,
    #[serde(default)]
    pub enable_open_code_routing: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

pub const MAX_RECENT_PROJECTS: usize = 10;

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: None,
            notification_sound: true,
            open_projects: Vec::new(),
            active_project_path: None,
            recent_projects: Vec::new(),
            preferred_cli: None,
            cli_fallback_order: None,
            execution_mode: ExecutionMode::Balanced,
            anthropic_status_cache: None,
            enable_open_code_routing: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Pushes/moves `project` to the front of `recentProjects`, capping the
    /// list at [`MAX_RECENT_PROJECTS`] (spec.md §6).
    pub fn touch_recent_project(&mut self, project: RecentProject) {
        self.recent_projects.retain(|p| p.path != project.path);
        self.recent_projects.insert(0, project);
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);
    }
}

/// User-global settings store, persisted at [`settings_path`] (spec.md §6
/// "Config directory"). Grounded on `tandem-core/src/config.rs`'s
/// `ConfigStore`, trimmed from its multi-layer (global/project/managed/env/
/// runtime/cli) merge down to the single global settings document this spec
/// calls for — there is no per-project or managed config layer in scope
/// here, just one `settings` file plus the sibling `cost-history`/
/// `learning`/`principles` stores described in §6.
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsStore {
    pub async fn load() -> Self {
        Self::load_from(settings_path()).await
    }

    pub async fn load_from(path: PathBuf) -> Self {
        let settings = read_json_or_default::<Settings>(&path).await;
        Self {
            path,
            settings: RwLock::new(settings),
        }
    }

    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn set(&self, settings: Settings) -> anyhow::Result<()> {
        atomic_write_json(&self.path, &settings).await?;
        *self.settings.write().await = settings;
        Ok(())
    }

    pub async fn update(
        &self,
        f: impl FnOnce(&mut Settings),
    ) -> anyhow::Result<Settings> {
        let mut settings = self.settings.write().await;
        f(&mut settings);
        atomic_write_json(&self.path, &*settings).await?;
        Ok(settings.clone())
    }
}

/// Loads the user-customized coding principles Markdown, stripping
/// HTML-comment placeholders (spec.md §6 "principles"). Returns `None` if
/// the file does not exist — the Engine then falls back to its built-in
/// principles list (spec.md §4.8 step 8).
pub async fn load_principles() -> Option<String> {
    let path = crate::paths::principles_path();
    let raw = tokio::fs::read_to_string(&path).await.ok()?;
    Some(strip_html_comments(&raw).trim().to_string())
}

fn strip_html_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Presence flag for first-launch onboarding (spec.md §6 `.first-launch`).
pub async fn mark_first_launch_seen() -> anyhow::Result<()> {
    let path = crate::paths::first_launch_flag_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, b"").await?;
    Ok(())
}

pub async fn is_first_launch() -> bool {
    !tokio::fs::try_exists(crate::paths::first_launch_flag_path())
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_file(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("ralph-core-settings-{name}-{ts}.json"))
    }

    #[tokio::test]
    async fn round_trips_settings_through_disk() {
        let path = unique_temp_file("roundtrip");
        let store = SettingsStore::load_from(path.clone()).await;
        store
            .update(|s| {
                s.theme = Some("dark".into());
                s.execution_mode = ExecutionMode::SuperSaver;
            })
            .await
            .unwrap();

        let reloaded = SettingsStore::load_from(path.clone()).await;
        let settings = reloaded.get().await;
        assert_eq!(settings.theme.as_deref(), Some("dark"));
        assert_eq!(settings.execution_mode, ExecutionMode::SuperSaver);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn recent_projects_caps_at_ten_and_dedupes_by_path() {
        let mut settings = Settings::default();
        for i in 0..12 {
            settings.touch_recent_project(RecentProject {
                path: format!("/proj/{i}"),
                name: format!("proj-{i}"),
                color: None,
                icon: None,
                last_accessed: Utc::now(),
            });
        }
        assert_eq!(settings.recent_projects.len(), MAX_RECENT_PROJECTS);
        assert_eq!(settings.recent_projects[0].path, "/proj/11");

        settings.touch_recent_project(RecentProject {
            path: "/proj/11".into(),
            name: "proj-11-renamed".into(),
            color: None,
            icon: None,
            last_accessed: Utc::now(),
        });
        let matches = settings
            .recent_projects
            .iter()
            .filter(|p| p.path == "/proj/11")
            .count();
        assert_eq!(matches, 1);
    }

    #[test]
    fn strips_html_comment_placeholders() {
        let input = "# Principles\n<!-- keep this out -->\nDRY.\n";
        assert_eq!(strip_html_comments(input), "# Principles\n\nDRY.\n");
    }
}
