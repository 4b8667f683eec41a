use std::path::{Path, PathBuf};

/// User-global config directory, platform-conventional root + `ralph-ultra/`
/// subpath (spec.md §6 "Config directory"). Honors `RALPH_ULTRA_CONFIG_DIR`
/// for tests and CI, mirroring the teacher's `TANDEM_GLOBAL_CONFIG`
/// override convention (`tandem-core/src/config.rs`).
pub fn config_root() -> PathBuf {
    if let Ok(dir) = std::env::var("RALPH_ULTRA_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ralph-ultra")
}

pub fn settings_path() -> PathBuf {
    config_root().join("settings.json")
}

pub fn cost_history_path() -> PathBuf {
    config_root().join("cost-history.json")
}

pub fn learning_path() -> PathBuf {
    config_root().join("learning.json")
}

pub fn principles_path() -> PathBuf {
    config_root().join("principles.md")
}

pub fn first_launch_flag_path() -> PathBuf {
    config_root().join(".first-launch")
}

/// Per-project paths, all relative to the project root that holds the PRD.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn prd(&self) -> PathBuf {
        self.root.join("prd.json")
    }

    pub fn progress(&self) -> PathBuf {
        self.root.join("execution-progress.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(".ralph-backups")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(".archive")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn session_log(&self) -> PathBuf {
        self.logs_dir().join("ralph-session.log")
    }

    pub fn engine_log(&self) -> PathBuf {
        self.logs_dir().join("ralph-ultra.log")
    }

    /// Unique prompt file for one launch attempt, removed on session exit
    /// (spec.md §9 "Ownership of multiplexer and subprocess resources").
    pub fn prompt_file(&self, attempt_token: &str) -> PathBuf {
        self.root
            .join(".ralph-prompts")
            .join(format!("prompt-{attempt_token}.md"))
    }
}

/// Sanitizes a branch name into a multiplexer session name component
/// (spec.md §4.8 step 9: `"ralph-" + sanitize(branchName)`).
pub fn sanitize_session_component(branch_name: &str) -> String {
    let mut out = String::with_capacity(branch_name.len());
    for ch in branch_name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

pub fn session_name(branch_name: &str) -> String {
    format!("ralph-{}", sanitize_session_component(branch_name))
}

pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let root = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_branch_names_with_slashes() {
        assert_eq!(session_name("ralph/demo"), "ralph-ralph-demo");
        assert_eq!(sanitize_session_component("feat/ABC_123"), "feat-ABC_123");
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(sanitize_session_component("a//b  c"), "a-b-c");
    }

    #[test]
    fn config_root_honors_env_override() {
        std::env::set_var("RALPH_ULTRA_CONFIG_DIR", "/tmp/ralph-ultra-test-config");
        assert_eq!(
            config_root(),
            PathBuf::from("/tmp/ralph-ultra-test-config")
        );
        std::env::remove_var("RALPH_ULTRA_CONFIG_DIR");
    }
}
