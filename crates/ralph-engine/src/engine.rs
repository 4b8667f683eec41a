use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use ralph_core::{paths::ProjectPaths, RalphError};
use ralph_quota::manager::QuotaManager;
use ralph_tracking::{CostTracker, LearningRecorder};
use ralph_types::{
    AgentActivity, EngineEvent, ExecutionMode, ModelPerformanceRecord, Prd, StreamRecord, ToolCallSummary,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cli::{self, CliHealthCache};
use crate::prompt;
use crate::session::SessionBackend;
use crate::state::{EngineState, EngineStatus, ProcessState, MAX_ITERATIONS, MAX_RETRIES_PER_STORY, STOPPING_WATCHDOG_TICKS};
use crate::stream::{self, ParserState, StreamOutput};
use crate::verify;

/// Session-liveness poll cadence (spec.md §4.8 "Session monitor: a periodic
/// task (≈3 s)").
const MONITOR_TICK: Duration = Duration::from_secs(3);
/// Log-tailing poll cadence (spec.md §5 "A log tailer at ≈500 ms cadence").
const TAILER_TICK: Duration = Duration::from_millis(500);
/// Grace periods for the complexity/API-health launch gates (spec.md §4.8
/// steps 3/4).
const COMPLEXITY_GATE_GRACE: Duration = Duration::from_secs(5);
const API_HEALTH_GATE_GRACE: Duration = Duration::from_secs(3);
/// Inter-story and retry spacing (spec.md §4.8 end-of-session step 8).
const NEXT_STORY_DELAY: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Session ended implausibly quickly after a resume attempt (spec.md §4.8
/// end-of-session step 2, §8 "A session ending in <10 s on a resume attempt").
const QUICK_SESSION_THRESHOLD: Duration = Duration::from_secs(10);

/// Word-count / AC-count thresholds for the complexity gate (spec.md §4.8
/// step 3: "if the story's description word-count exceeds a threshold, its
/// AC count exceeds a threshold, or it contains complexity keywords"). Exact
/// numbers are left implementation-defined by spec.md §9; recorded as an
/// Open Question decision in DESIGN.md.
const COMPLEXITY_WORD_THRESHOLD: usize = 400;
const COMPLEXITY_AC_THRESHOLD: usize = 8;
const COMPLEXITY_KEYWORDS: &[&str] = &["migration", "architecture", "rewrite", "distributed", "concurrency"];

fn is_complex_story(story: &ralph_types::UserStory) -> bool {
    let word_count = story.description.split_whitespace().count();
    if word_count > COMPLEXITY_WORD_THRESHOLD {
        return true;
    }
    if story.acceptance_criteria.len() > COMPLEXITY_AC_THRESHOLD {
        return true;
    }
    let lower = story.description.to_lowercase();
    COMPLEXITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

enum StoryOutcome {
    /// Advance to the next story id, or finish the run if `None`.
    Advance(Option<String>),
    Paused,
    Stopped,
}

/// The Execution Engine: one instance per open project (spec.md §4.8).
/// Concurrency model follows spec.md §5: one `Mutex<EngineState>` guarding
/// mutable state, with monitor/tailer activity implemented as polling loops
/// inside the spawned story-cycle task rather than free-standing background
/// tasks, so there is exactly one logical owner of state transitions.
/// Grounded on the teacher's `RalphLoopManager`/`RalphRunHandle`
/// (`src-tauri/src/ralph/service.rs`): a `CancellationToken` drives `Stop`,
/// generalized here from "one open iteration loop" to "story lifecycle with
/// relaunch/retry/skip."
#[derive(Clone)]
pub struct Engine {
    paths: ProjectPaths,
    bus: ralph_core::EventBus,
    quota_manager: Arc<QuotaManager>,
    cost_tracker: Arc<CostTracker>,
    learning_recorder: Arc<LearningRecorder>,
    session_backend: Arc<dyn SessionBackend>,
    cli_cache: Arc<CliHealthCache>,
    state: Arc<Mutex<EngineState>>,
    cancel: Arc<StdMutex<Option<CancellationToken>>>,
}

impl Engine {
    pub fn new(
        project_root: impl Into<PathBuf>,
        bus: ralph_core::EventBus,
        quota_manager: Arc<QuotaManager>,
        cost_tracker: Arc<CostTracker>,
        learning_recorder: Arc<LearningRecorder>,
    ) -> Self {
        Self {
            paths: ProjectPaths::new(project_root),
            bus,
            quota_manager,
            cost_tracker,
            learning_recorder,
            session_backend: Arc::new(crate::session::TmuxSessionBackend::new()),
            cli_cache: Arc::new(CliHealthCache::new()),
            state: Arc::new(Mutex::new(EngineState::new())),
            cancel: Arc::new(StdMutex::new(None)),
        }
    }

    /// Swaps in a different [`SessionBackend`] (used by tests, and by any
    /// caller that wants a non-`tmux` multiplexer).
    pub fn with_session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_backend = backend;
        self
    }

    /// Swaps in a pre-seeded [`CliHealthCache`] (used by tests that have no
    /// real CLI binary on disk to health-check against).
    pub fn with_cli_cache(mut self, cache: Arc<CliHealthCache>) -> Self {
        self.cli_cache = cache;
        self
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        if let Ok(mut state) = self.state.try_lock() {
            state.debug_mode = enabled;
        }
    }

    pub async fn get_status(&self) -> EngineStatus {
        let state = self.state.lock().await;
        EngineStatus {
            process_state: state.process_state.as_str(),
            current_story_id: state.current_story_id.clone(),
            current_session_id: state.current_session_id.clone(),
            iterations_this_story: state.iterations_this_story,
            retries_this_story: state.retries_this_story,
        }
    }

    pub async fn get_live_output(&self) -> Vec<StreamRecord> {
        self.state.lock().await.output_ring.as_slice()
    }

    pub async fn get_agent_activity(&self) -> AgentActivity {
        self.state.lock().await.activity.clone()
    }

    pub async fn has_paused_session(&self, story_id: &str) -> bool {
        let progress: ralph_types::ExecutionProgress =
            ralph_core::read_json_or_default(&self.paths.progress()).await;
        progress
            .story(story_id)
            .map(|s| s.is_paused())
            .unwrap_or(false)
    }

    pub async fn list_backups(&self) -> anyhow::Result<Vec<ralph_core::backup::BackupEntry>> {
        ralph_core::backup::list_backups(&self.paths.backups_dir()).await
    }

    /// `RestoreFromBackup(name)`: restores a PRD snapshot and writes it back
    /// as the active PRD (spec.md §5 operations list).
    pub async fn restore_from_backup(&self, name: &str) -> anyhow::Result<()> {
        let bytes = ralph_core::backup::restore_from_backup(&self.paths.backups_dir(), name).await?;
        ralph_core::atomic_write(&self.paths.prd(), &bytes).await?;
        Ok(())
    }

    /// `Run`/`RunStory` (spec.md §4.8 "Launch path"). Validates state,
    /// resolves the story to attempt, and spawns the story-cycle loop in the
    /// background; returns as soon as the loop is scheduled, not when it
    /// finishes. `GetStatus` and the Event Bus are how callers observe
    /// progress.
    pub async fn run(&self, requested_story_id: Option<String>, mode: ExecutionMode) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.process_state {
                ProcessState::Running => {
                    anyhow::bail!(RalphError::RuntimeAnomaly("engine is already running".to_string()));
                }
                ProcessState::External => {
                    if let Some(session_id) = state.current_session_id.clone() {
                        let _ = self.session_backend.kill(&session_id).await;
                    }
                }
                _ => {}
            }
            state.process_state = ProcessState::Running;
        }

        let prd: Prd = ralph_core::read_json(&self.paths.prd()).await.map_err(|e| {
            RalphError::ConfigurationError(format!("missing or invalid PRD at {:?}: {e}", self.paths.prd()))
        })?;

        let story_id = match requested_story_id.or_else(|| prd.next_story().map(|s| s.id.clone())) {
            Some(id) => id,
            None => {
                self.state.lock().await.process_state = ProcessState::Idle;
                self.bus.emit(EngineEvent::ExecutionComplete {
                    project: prd.project.clone(),
                    stories_completed: 0,
                    stories_successful: 0,
                    timestamp: Utc::now(),
                });
                return Ok(());
            }
        };

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());

        let engine = self.clone();
        tokio::spawn(async move {
            engine.story_cycle(prd, story_id, mode, token).await;
        });

        Ok(())
    }

    pub async fn run_story(&self, story_id: String, mode: ExecutionMode) -> anyhow::Result<()> {
        self.run(Some(story_id), mode).await
    }

    /// `RetryCurrent`: relaunches the in-progress story from its persisted
    /// paused state (spec.md §5 operations list).
    pub async fn retry_current(&self, mode: ExecutionMode) -> anyhow::Result<()> {
        let story_id = self
            .state
            .lock()
            .await
            .current_story_id
            .clone()
            .ok_or_else(|| RalphError::ConfigurationError("no current story to retry".to_string()))?;
        self.run(Some(story_id), mode).await
    }

    /// `Stop`: kills the multiplexer session, persists pause state, and
    /// transitions to `paused` (spec.md §4.8, §5 "Cancellation / timeouts").
    pub async fn stop(&self) -> anyhow::Result<()> {
        if let Some(token) = self.cancel.lock().unwrap().clone() {
            token.cancel();
        }

        let mut state = self.state.lock().await;
        state.process_state = ProcessState::Stopping;
        if let Some(session_id) = state.current_session_id.clone() {
            let _ = self.session_backend.kill(&session_id).await;
        }
        state.process_state = ProcessState::Paused;

        self.bus.emit(EngineEvent::ExecutionPaused {
            story_id: state.current_story_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Drives one story through completion, retry, or skip, then advances to
    /// the next story until the PRD is exhausted, the run is stopped, or it
    /// pauses (spec.md §4.8 end-of-session step 8).
    async fn story_cycle(&self, mut prd: Prd, mut story_id: String, mode: ExecutionMode, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                return;
            }

            match self.launch_and_verify(&mut prd, &story_id, mode, &token).await {
                Ok(StoryOutcome::Advance(Some(next_id))) => {
                    story_id = next_id;
                    tokio::time::sleep(NEXT_STORY_DELAY).await;
                }
                Ok(StoryOutcome::Advance(None)) => {
                    self.state.lock().await.process_state = ProcessState::Idle;
                    self.bus.emit(EngineEvent::ExecutionComplete {
                        project: prd.project.clone(),
                        stories_completed: prd.user_stories.iter().filter(|s| s.passes || s.is_skipped()).count() as u32,
                        stories_successful: prd.user_stories.iter().filter(|s| s.passes).count() as u32,
                        timestamp: Utc::now(),
                    });
                    return;
                }
                Ok(StoryOutcome::Paused) | Ok(StoryOutcome::Stopped) => {
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "story attempt failed fatally");
                    self.state.lock().await.process_state = ProcessState::Idle;
                    return;
                }
            }
        }
    }

    /// Steps 1-11 of the launch path, the live-stream tail, and the
    /// end-of-session verification (spec.md §4.8).
    async fn launch_and_verify(
        &self,
        prd: &mut Prd,
        story_id: &str,
        mode: ExecutionMode,
        token: &CancellationToken,
    ) -> anyhow::Result<StoryOutcome> {
        let story = prd
            .story(story_id)
            .cloned()
            .ok_or_else(|| RalphError::ConfigurationError(format!("unknown story id {story_id}")))?;

        let mut progress: ralph_types::ExecutionProgress =
            ralph_core::read_json_or_default(&self.paths.progress()).await;
        let is_resume = progress.story(story_id).map(|s| s.is_paused()).unwrap_or(false);

        {
            let mut state = self.state.lock().await;
            if is_resume {
                state.current_story_id = Some(story_id.to_string());
            } else {
                state.reset_for_new_story(story_id.to_string());
            }
            if state.iterations_this_story >= MAX_ITERATIONS {
                return self.skip_story(prd, story_id, "iteration cap reached").await;
            }
        }

        if is_complex_story(&story) && !token.is_cancelled() {
            tracing::warn!(story_id, "complexity gate: story exceeds thresholds, granting grace period");
            tokio::time::sleep(COMPLEXITY_GATE_GRACE).await;
        }

        // API-health gate: a live status probe is outside this crate's scope
        // (it belongs to the settings-cached `anthropicStatusCache`, §6);
        // callers that have a cached `degraded`/`outage` reading can extend
        // this gate. Absent that input the gate is a no-op grace skip.
        let _ = API_HEALTH_GATE_GRACE;

        let quotas = self.quota_manager.snapshot().await;
        let recommended = ralph_quota::capability::get_recommended_model(
            ralph_planner::detect_task_type(&story),
            mode,
            &quotas,
        );

        let preferred_cli = cli::cli_for_provider(&recommended.provider);
        let cli_id = if self.cli_cache.is_healthy(preferred_cli).await {
            preferred_cli.to_string()
        } else {
            let cli_chain = cli::fallback_chain(prd, None, None);
            match cli::resolve_healthy_cli(&cli_chain, &self.cli_cache).await {
                Some(id) => id,
                None => {
                    self.state.lock().await.process_state = ProcessState::Idle;
                    anyhow::bail!(RalphError::EnvironmentError("no healthy CLI found in fallback chain".to_string()));
                }
            }
        };

        let resume_token = progress.story(story_id).and_then(|s| s.session_id.clone());
        let prompt_text = if is_resume {
            prompt::build_resume_prompt(&story, progress.story(story_id).expect("checked above"))
        } else {
            let principles = ralph_core::load_principles().await;
            prompt::build_fresh_prompt(&story, principles.as_deref())
        };

        let attempt_token = uuid::Uuid::new_v4().to_string();
        let prompt_path = self.paths.prompt_file(&attempt_token);
        if let Some(parent) = prompt_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&prompt_path, prompt_text.as_bytes()).await?;

        let command = cli::build_command(
            &cli_id,
            &recommended.model_id,
            &recommended.provider,
            &prompt_path,
            resume_token.as_deref(),
        );
        let session_name = ralph_core::paths::session_name(&prd.branch_name);
        self.session_backend.create(&session_name, &self.paths.root).await?;
        self.session_backend
            .send_keys(&session_name, &shell_join(&command))
            .await?;

        {
            let mut state = self.state.lock().await;
            state.current_session_id = Some(session_name.clone());
            state.iterations_this_story += 1;
        }

        self.cost_tracker
            .start_story(
                story_id.to_string(),
                recommended.model_id.clone(),
                recommended.provider.clone(),
                self.quota_manager.estimate_cost(&recommended.model_id, 5_000, 2_000),
                progress.story(story_id).map(|s| s.attempts).unwrap_or(0),
            )
            .await;

        self.bus.emit(EngineEvent::StoryStarted {
            story_id: story_id.to_string(),
            model_id: recommended.model_id.clone(),
            provider: recommended.provider.clone(),
            attempt: progress.story(story_id).map(|s| s.attempts + 1).unwrap_or(1),
            timestamp: Utc::now(),
        });

        let start = std::time::Instant::now();
        let tail_result = self.tail_until_session_ends(&session_name, token).await;
        let duration = start.elapsed();

        let _ = tokio::fs::remove_file(&prompt_path).await;

        if token.is_cancelled() {
            self.persist_pause(&mut progress, story_id, &session_name).await?;
            return Ok(StoryOutcome::Paused);
        }
        if !tail_result {
            // Defensive: monitor never observed the session end within the
            // iteration cap; treat as a runtime anomaly and move to idle
            // rather than spin forever (spec.md §4.8 "stopping... force-reset").
            self.state.lock().await.process_state = ProcessState::Idle;
            return Ok(StoryOutcome::Paused);
        }

        self.finish_story(prd, &mut progress, story_id, &recommended, duration, resume_token.is_some())
            .await
    }

    /// Polls `session_backend.is_alive` at [`MONITOR_TICK`] cadence
    /// (spec.md §4.8 "Session monitor") while also tailing the session log at
    /// [`TAILER_TICK`] cadence (spec.md §5). Each monitor tick also advances
    /// the `stopping`-state watchdog, force-resetting to `idle` once it has
    /// persisted for [`STOPPING_WATCHDOG_TICKS`] ticks. Returns `false` if
    /// cancelled or if the watchdog fired.
    async fn tail_until_session_ends(&self, session_name: &str, token: &CancellationToken) -> bool {
        let log_path = self.paths.session_log();
        let mut parser_state = ParserState::default();
        let mut monitor_interval = tokio::time::interval(MONITOR_TICK);
        let mut tailer_interval = tokio::time::interval(TAILER_TICK);

        loop {
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tailer_interval.tick() => {
                    self.tail_log_once(&log_path, &mut parser_state).await;
                }
                _ = monitor_interval.tick() => {
                    {
                        let mut state = self.state.lock().await;
                        if state.process_state == ProcessState::Stopping {
                            state.stopping_ticks += 1;
                            if state.stopping_ticks >= STOPPING_WATCHDOG_TICKS {
                                tracing::warn!("stopping state persisted past watchdog, forcing idle");
                                state.process_state = ProcessState::Idle;
                                state.stopping_ticks = 0;
                                return false;
                            }
                        } else {
                            state.stopping_ticks = 0;
                        }
                    }
                    if !self.session_backend.is_alive(session_name).await {
                        self.tail_log_once(&log_path, &mut parser_state).await;
                        return true;
                    }
                }
            }
        }
    }

    async fn tail_log_once(&self, log_path: &std::path::Path, parser_state: &mut ParserState) {
        let mut state = self.state.lock().await;
        let Ok(contents) = tokio::fs::read_to_string(log_path).await else {
            return;
        };
        let bytes = contents.as_bytes();
        if (bytes.len() as u64) < state.log_cursor {
            // Log truncated (new attempt); reset cursor (spec.md §5).
            state.log_cursor = 0;
        }
        let start = state.log_cursor as usize;
        if start >= bytes.len() {
            return;
        }
        let new_text = String::from_utf8_lossy(&bytes[start..]).into_owned();
        state.log_cursor = bytes.len() as u64;

        for line in new_text.lines() {
            for output in stream::parse_line(line, parser_state) {
                apply_stream_output(&mut state, output);
            }
        }
        if let Some(model) = &parser_state.model {
            state.activity.metrics.model = Some(model.clone());
        }

        self.bus.emit(EngineEvent::StoryProgress {
            story_id: state.current_story_id.clone().unwrap_or_default(),
            activity: state.activity.clone(),
            timestamp: Utc::now(),
        });
    }

    async fn persist_pause(
        &self,
        progress: &mut ralph_types::ExecutionProgress,
        story_id: &str,
        session_name: &str,
    ) -> anyhow::Result<()> {
        let entry = progress.story_mut(story_id);
        entry.paused = Some(true);
        entry.session_id = Some(session_name.to_string());
        progress.touch();
        ralph_core::atomic_write_json(&self.paths.progress(), &*progress).await?;
        self.state.lock().await.process_state = ProcessState::Paused;
        Ok(())
    }

    /// End-of-session path (`VerifyAndContinue`, spec.md §4.8).
    async fn finish_story(
        &self,
        prd: &mut Prd,
        progress: &mut ralph_types::ExecutionProgress,
        story_id: &str,
        recommended: &ralph_types::RecommendedModel,
        duration: Duration,
        used_resume_token: bool,
    ) -> anyhow::Result<StoryOutcome> {
        if used_resume_token && duration < QUICK_SESSION_THRESHOLD {
            progress.story_mut(story_id).session_id = None;
        }

        let story = prd.story_mut(story_id).ok_or_else(|| {
            RalphError::ConfigurationError(format!("story {story_id} disappeared mid-run"))
        })?;

        let session_ended_cleanly = true;
        let outcome = verify::verify_acceptance_criteria(
            &self.paths.root,
            &mut story.acceptance_criteria,
            session_ended_cleanly,
        )
        .await;

        story.passes = story.acceptance_criteria.all_pass(outcome.all_pass);
        let story_title = story.title.clone();
        let story_complexity = story.complexity;
        let task_type = ralph_planner::detect_task_type(story);

        ralph_core::backup::backup_prd(&self.paths, serde_json::to_string_pretty(&prd)?.as_bytes()).await.ok();
        ralph_core::atomic_write_json(&self.paths.prd(), &prd).await?;

        if prd.all_done() {
            ralph_core::backup::archive_completed_prd(&self.paths, serde_json::to_string_pretty(&prd)?.as_bytes())
                .await
                .ok();
        }

        let (input_tokens, output_tokens, activity) = {
            let state = self.state.lock().await;
            (
                state.activity.metrics.total_input_tokens,
                state.activity.metrics.total_output_tokens,
                state.activity.clone(),
            )
        };
        let total_tokens = input_tokens + output_tokens;
        let actual_cost = self.quota_manager.estimate_cost(&recommended.model_id, input_tokens, output_tokens);

        let ac_total = outcome.passing_ids.len() + outcome.failing_ids.len();
        let ac_passed = outcome.passing_ids.len();
        let ac_pass_rate = if ac_total == 0 { 1.0 } else { ac_passed as f64 / ac_total as f64 };

        self.cost_tracker
            .end_story(story_id, actual_cost, input_tokens, output_tokens, outcome.all_pass)
            .await
            .ok();

        self.learning_recorder
            .record_run(ModelPerformanceRecord {
                project: prd.project.clone(),
                story_id: story_id.to_string(),
                story_title,
                task_type,
                complexity: story_complexity,
                provider: recommended.provider.clone(),
                model_id: recommended.model_id.clone(),
                duration_minutes: duration.as_secs_f64() / 60.0,
                input_tokens,
                output_tokens,
                total_tokens,
                cost_usd: actual_cost,
                success: outcome.all_pass,
                retry_count: progress.story(story_id).map(|s| s.attempts).unwrap_or(0),
                ac_total: ac_total as u32,
                ac_passed: ac_passed as u32,
                ac_pass_rate,
                timestamp: Utc::now(),
            })
            .await
            .ok();

        let entry = progress.story_mut(story_id);
        entry.last_attempt = Some(Utc::now());
        entry.attempts += 1;
        entry.passed = outcome.all_pass;
        entry.passing_acs = outcome.passing_ids.clone();
        entry.failing_acs = outcome.failing_ids.clone();
        progress.touch();

        if outcome.runner_inaccessible {
            ralph_core::atomic_write_json(&self.paths.progress(), &*progress).await?;
            tracing::warn!(story_id, "acceptance test runner inaccessible; holding at idle");
            self.state.lock().await.process_state = ProcessState::Idle;
            return Ok(StoryOutcome::Paused);
        }

        if outcome.all_pass {
            let entry = progress.story_mut(story_id);
            entry.paused = Some(false);
            entry.session_id = None;
            entry.failure_reasons.clear();
            ralph_core::atomic_write_json(&self.paths.progress(), &*progress).await?;

            self.bus.emit(EngineEvent::StoryCompleted {
                story_id: story_id.to_string(),
                progress: progress.story(story_id).cloned().expect("just written"),
                timestamp: Utc::now(),
            });

            let _ = activity;
            if let Some(session_id) = self.state.lock().await.current_session_id.clone() {
                let _ = self.session_backend.kill(&session_id).await;
            }

            Ok(StoryOutcome::Advance(prd.next_story().map(|s| s.id.clone())))
        } else {
            let mut state = self.state.lock().await;
            state.retries_this_story += 1;
            let retries = state.retries_this_story;
            let iterations = state.iterations_this_story;
            drop(state);

            self.bus.emit(EngineEvent::StoryFailed {
                story_id: story_id.to_string(),
                reason: format!("{}/{} acceptance criteria failing", outcome.failing_ids.len(), ac_total),
                attempt: retries,
                will_retry: retries < MAX_RETRIES_PER_STORY && iterations < MAX_ITERATIONS,
                timestamp: Utc::now(),
            });

            if retries >= MAX_RETRIES_PER_STORY || iterations >= MAX_ITERATIONS {
                return self.skip_story(prd, story_id, "retry/iteration cap exceeded").await;
            }

            let entry = progress.story_mut(story_id);
            entry.paused = Some(true);
            entry.session_id = self.state.lock().await.current_session_id.clone();
            ralph_core::atomic_write_json(&self.paths.progress(), &*progress).await?;

            tokio::time::sleep(RETRY_DELAY).await;
            Ok(StoryOutcome::Advance(Some(story_id.to_string())))
        }
    }

    async fn skip_story(&self, prd: &mut Prd, story_id: &str, reason: &str) -> anyhow::Result<StoryOutcome> {
        if let Some(story) = prd.story_mut(story_id) {
            story.skipped = Some(true);
        }
        ralph_core::atomic_write_json(&self.paths.prd(), &prd).await?;
        tracing::warn!(story_id, reason, "story skipped");
        Ok(StoryOutcome::Advance(prd.next_story().map(|s| s.id.clone())))
    }
}

fn apply_stream_output(state: &mut EngineState, output: StreamOutput) {
    match output {
        StreamOutput::Text(text) => {
            state.activity.is_thinking = true;
            state.activity.last_thinking_snippet = Some(text.clone());
            state.output_ring.push(StreamRecord::Text { content: text });
        }
        StreamOutput::ToolStart { name, input_summary } => {
            state.activity.is_thinking = false;
            state.activity.current_tool = Some(name.clone());
            state.activity.current_tool_input_summary = Some(input_summary.clone());
            state.activity.metrics.tool_call_count += 1;
            state.activity.push_tool(ToolCallSummary {
                name: name.clone(),
                input_summary: input_summary.clone(),
            });
            state
                .output_ring
                .push(StreamRecord::ToolStart { tool: name, input_summary });
        }
        StreamOutput::Result { text } => {
            state.activity.current_tool = None;
            state.output_ring.push(StreamRecord::Result { content: text });
        }
        StreamOutput::System { message } => {
            tracing::debug!(%message, "malformed or system stream event");
            state.output_ring.push(StreamRecord::System { content: message });
        }
        StreamOutput::Usage { input_tokens, output_tokens, cost_usd } => {
            state.activity.metrics.total_input_tokens += input_tokens;
            state.activity.metrics.total_output_tokens += output_tokens;
            state.activity.metrics.cost_usd += cost_usd;
        }
        StreamOutput::ModelUpdate(model) => {
            state.activity.metrics.model = Some(model);
        }
    }
}

fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.chars().any(|c| c.is_whitespace()) {
                format!("'{}'", arg.replace('\'', "'\\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_gate_flags_long_descriptions() {
        let mut story = sample_story();
        story.description = "word ".repeat(500);
        assert!(is_complex_story(&story));
    }

    #[test]
    fn complexity_gate_flags_keyword_matches() {
        let mut story = sample_story();
        story.description = "Plan the database migration carefully".to_string();
        assert!(is_complex_story(&story));
    }

    #[test]
    fn complexity_gate_passes_simple_stories() {
        let story = sample_story();
        assert!(!is_complex_story(&story));
    }

    #[test]
    fn shell_join_quotes_args_with_spaces() {
        let joined = shell_join(&["claude".to_string(), "--model".to_string(), "a b".to_string()]);
        assert_eq!(joined, "claude --model 'a b'");
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_state_force_resets_after_watchdog_ticks() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = ralph_core::EventBus::new();
        let quota_manager = Arc::new(QuotaManager::new(bus.clone()));
        let cost_tracker = Arc::new(CostTracker::load(tmp.path().join("costs.json")).await);
        let learning_recorder = Arc::new(LearningRecorder::load(tmp.path().join("learning.json"), bus.clone()).await);
        let backend: Arc<dyn SessionBackend> = Arc::new(crate::test_support::FakeSessionBackend::default());
        backend.create("demo-session", tmp.path()).await.unwrap();

        let engine = Engine::new(tmp.path(), bus, quota_manager, cost_tracker, learning_recorder)
            .with_session_backend(backend);

        {
            let mut state = engine.state.lock().await;
            state.process_state = ProcessState::Stopping;
        }

        let token = CancellationToken::new();
        let ended_normally = engine.tail_until_session_ends("demo-session", &token).await;

        assert!(!ended_normally);
        let state = engine.state.lock().await;
        assert_eq!(state.process_state, ProcessState::Idle);
        assert_eq!(state.stopping_ticks, 0);
    }

    #[test]
    fn cli_selection_prefers_provider_mapped_cli_before_fallback_chain() {
        // launch_and_verify seeds its CLI choice from the recommended
        // provider (spec.md §4.8 step 5) before ever consulting the chain.
        assert_eq!(cli::cli_for_provider("anthropic"), "anthropic");
        assert_eq!(cli::cli_for_provider("openai"), "generic");
    }

    fn sample_story() -> ralph_types::UserStory {
        ralph_types::UserStory {
            id: "US-001".into(),
            title: "Create file hello.txt".into(),
            description: "Create a file hello.txt at project root with the text hi".into(),
            acceptance_criteria: ralph_types::AcceptanceCriteria::Text(vec!["hello.txt exists".into()]),
            complexity: ralph_types::Complexity::Simple,
            priority: 1,
            passes: false,
            skipped: None,
        }
    }
}
