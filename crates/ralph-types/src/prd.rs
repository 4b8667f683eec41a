use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Story complexity, used by the planner's token estimate table and the
/// engine's complexity gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// A single acceptance criterion with an optional shell-executable test
/// command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceCriterion {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default)]
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl AcceptanceCriterion {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Acceptance criteria are either a flat list of free-text strings (passed
/// implicitly when a session ends clean) or a list of typed criteria, each
/// with its own optional test command. The two forms are distinguished by
/// shape on the wire: an array of JSON strings vs. an array of objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcceptanceCriteria {
    Text(Vec<String>),
    Typed(Vec<AcceptanceCriterion>),
}

impl AcceptanceCriteria {
    pub fn len(&self) -> usize {
        match self {
            AcceptanceCriteria::Text(v) => v.len(),
            AcceptanceCriteria::Typed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated criterion text, used by the task detector's corpus.
    pub fn corpus(&self) -> String {
        match self {
            AcceptanceCriteria::Text(v) => v.join(" "),
            AcceptanceCriteria::Typed(v) => v
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Whether every criterion currently passes. String-form criteria have
    /// no independent pass state; they pass once the story itself is marked
    /// passing by a clean session end (spec.md §3, §9 open question).
    pub fn all_pass(&self, story_passes: bool) -> bool {
        match self {
            AcceptanceCriteria::Text(_) => story_passes,
            AcceptanceCriteria::Typed(v) => v.iter().all(|c| c.passes),
        }
    }

    pub fn typed_mut(&mut self) -> Option<&mut Vec<AcceptanceCriterion>> {
        match self {
            AcceptanceCriteria::Typed(v) => Some(v),
            AcceptanceCriteria::Text(_) => None,
        }
    }

    pub fn typed(&self) -> Option<&[AcceptanceCriterion]> {
        match self {
            AcceptanceCriteria::Typed(v) => Some(v),
            AcceptanceCriteria::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: AcceptanceCriteria,
    pub complexity: Complexity,
    pub priority: u32,
    #[serde(default)]
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
}

impl UserStory {
    pub fn is_skipped(&self) -> bool {
        self.skipped.unwrap_or(false)
    }

    /// Concatenated title + description + AC text, lowercased, for task
    /// detection.
    pub fn corpus(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.acceptance_criteria.corpus()
        )
        .to_lowercase()
    }
}

/// The project root document: product requirements + story list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    pub project: String,
    pub description: String,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_fallback_order: Option<Vec<String>>,
    pub user_stories: Vec<UserStory>,
}

impl Prd {
    /// The next story that should run: first non-passing, non-skipped story
    /// in declaration order.
    pub fn next_story(&self) -> Option<&UserStory> {
        self.user_stories
            .iter()
            .find(|s| !s.passes && !s.is_skipped())
    }

    pub fn story_mut(&mut self, story_id: &str) -> Option<&mut UserStory> {
        self.user_stories.iter_mut().find(|s| s.id == story_id)
    }

    pub fn story(&self, story_id: &str) -> Option<&UserStory> {
        self.user_stories.iter().find(|s| s.id == story_id)
    }

    /// All stories pass or are explicitly skipped.
    pub fn all_done(&self) -> bool {
        self.user_stories.iter().all(|s| s.passes || s.is_skipped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_string_form_acceptance_criteria() {
        let json = r#"["hello.txt exists", "contains hi"]"#;
        let ac: AcceptanceCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(ac.len(), 2);
        assert!(ac.typed().is_none());
    }

    #[test]
    fn deserializes_typed_acceptance_criteria() {
        let json = r#"[{"id":"AC-1","text":"hello.txt exists","testCommand":"test -f hello.txt","passes":false,"lastRun":null}]"#;
        let ac: AcceptanceCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(ac.len(), 1);
        assert!(ac.typed().is_some());
    }

    #[test]
    fn next_story_skips_passing_and_skipped() {
        let mut prd = sample_prd();
        prd.user_stories[0].passes = true;
        prd.user_stories[1].skipped = Some(true);
        let next = prd.next_story().unwrap();
        assert_eq!(next.id, "US-003");
    }

    fn sample_prd() -> Prd {
        Prd {
            project: "demo".into(),
            description: "d".into(),
            branch_name: "ralph/demo".into(),
            cli: None,
            cli_fallback_order: None,
            user_stories: vec![
                UserStory {
                    id: "US-001".into(),
                    title: "one".into(),
                    description: "d".into(),
                    acceptance_criteria: AcceptanceCriteria::Text(vec!["a".into()]),
                    complexity: Complexity::Simple,
                    priority: 1,
                    passes: false,
                    skipped: None,
                },
                UserStory {
                    id: "US-002".into(),
                    title: "two".into(),
                    description: "d".into(),
                    acceptance_criteria: AcceptanceCriteria::Text(vec!["a".into()]),
                    complexity: Complexity::Simple,
                    priority: 2,
                    passes: false,
                    skipped: None,
                },
                UserStory {
                    id: "US-003".into(),
                    title: "three".into(),
                    description: "d".into(),
                    acceptance_criteria: AcceptanceCriteria::Text(vec!["a".into()]),
                    complexity: Complexity::Simple,
                    priority: 3,
                    passes: false,
                    skipped: None,
                },
            ],
        }
    }
}
