use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-story persisted execution record. Owned exclusively by the Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryProgress {
    pub story_id: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    pub passed: bool,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default)]
    pub passing_acs: Vec<String>,
    #[serde(default)]
    pub failing_acs: Vec<String>,
}

impl StoryProgress {
    pub fn new(story_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
            attempts: 0,
            last_attempt: None,
            passed: false,
            failure_reasons: Vec::new(),
            session_id: None,
            paused: None,
            passing_acs: Vec::new(),
            failing_acs: Vec::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub stories: Vec<StoryProgress>,
}

impl ExecutionProgress {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            last_updated: now,
            stories: Vec::new(),
        }
    }

    pub fn story_mut(&mut self, story_id: &str) -> &mut StoryProgress {
        if !self.stories.iter().any(|s| s.story_id == story_id) {
            self.stories.push(StoryProgress::new(story_id));
        }
        self.stories
            .iter_mut()
            .find(|s| s.story_id == story_id)
            .expect("just inserted")
    }

    pub fn story(&self, story_id: &str) -> Option<&StoryProgress> {
        self.stories.iter().find(|s| s.story_id == story_id)
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

impl Default for ExecutionProgress {
    fn default() -> Self {
        Self::new()
    }
}
