use ralph_types::{AgentActivity, OutputRing};

/// Per-story attempt cap (spec.md §4.8 step 7, §8 property 3).
pub const MAX_ITERATIONS: u32 = 10;
/// Per-story retry cap before the story is marked `skipped` (spec.md §4.8
/// end-of-session step 8, §8 property 3).
pub const MAX_RETRIES_PER_STORY: u32 = 3;
/// Monitor ticks a `stopping` state may persist before the defensive
/// force-reset to `idle` fires (spec.md §4.8 "A `stopping` state that
/// persists for three monitor ticks force-resets to `idle`").
pub const STOPPING_WATCHDOG_TICKS: u32 = 3;

/// Process states (spec.md §4.8 "Process states"). `External` means a live
/// multiplexer session exists that this Engine did not start; the Engine
/// tails it but does not own its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
    Stopping,
    Paused,
    External,
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::Idle
    }
}

/// The Engine's entire mutable state, guarded by one `tokio::sync::Mutex`
/// (spec.md §5 "a single logical owner"). Grounded on the teacher's
/// `RalphState` (`src-tauri/src/ralph/service.rs`), generalized from "one
/// open iteration loop" to "story lifecycle with monitor/tailer."
pub struct EngineState {
    pub process_state: ProcessState,
    pub current_story_id: Option<String>,
    pub current_session_id: Option<String>,
    pub activity: AgentActivity,
    pub output_ring: OutputRing,
    pub log_cursor: u64,
    pub iterations_this_story: u32,
    pub retries_this_story: u32,
    pub stopping_ticks: u32,
    pub debug_mode: bool,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            process_state: ProcessState::Idle,
            current_story_id: None,
            current_session_id: None,
            activity: AgentActivity::reset(),
            output_ring: OutputRing::default(),
            log_cursor: 0,
            iterations_this_story: 0,
            retries_this_story: 0,
            stopping_ticks: 0,
            debug_mode: false,
        }
    }

    /// Resets per-story counters for a fresh launch (not a resume).
    pub fn reset_for_new_story(&mut self, story_id: impl Into<String>) {
        self.current_story_id = Some(story_id.into());
        self.current_session_id = None;
        self.activity = AgentActivity::reset();
        self.output_ring = ralph_types::OutputRing::default();
        self.log_cursor = 0;
        self.iterations_this_story = 0;
        self.retries_this_story = 0;
        self.stopping_ticks = 0;
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot returned by `GetStatus` (spec.md §5 operations list).
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub process_state: &'static str,
    pub current_story_id: Option<String>,
    pub current_session_id: Option<String>,
    pub iterations_this_story: u32,
    pub retries_this_story: u32,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Idle => "idle",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Paused => "paused",
            ProcessState::External => "external",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_for_new_story_clears_counters() {
        let mut state = EngineState::new();
        state.iterations_this_story = 4;
        state.retries_this_story = 2;
        state.current_session_id = Some("sess-1".to_string());
        state.reset_for_new_story("US-002");
        assert_eq!(state.current_story_id.as_deref(), Some("US-002"));
        assert_eq!(state.iterations_this_story, 0);
        assert_eq!(state.retries_this_story, 0);
        assert!(state.current_session_id.is_none());
    }
}
