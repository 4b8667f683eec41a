use ralph_types::{AcceptanceCriteria, StoryProgress, UserStory};

/// Base coding principles included in every fresh-attempt prompt (spec.md
/// §4.8 step 8). Grounded on the teacher's `ralph/service.rs::build_prompt`
/// iteration-header convention, with this engine's own principle list.
pub const BASE_PRINCIPLES: &str = "\
## Coding principles
- DRY: don't repeat yourself; extract shared logic instead of copying it.
- Small steps: make the smallest change that moves the story forward.
- Crash early: fail loudly on invariant violations instead of masking them.
- Law of Demeter: talk to your immediate collaborators, not their internals.
- Match existing patterns: follow the conventions already used in this codebase.
- Pre-coding checklist: read the relevant files before writing any code.\
";

fn acceptance_criteria_block(ac: &AcceptanceCriteria) -> String {
    match ac {
        AcceptanceCriteria::Text(items) => items
            .iter()
            .enumerate()
            .map(|(i, text)| format!("- AC-{}: {text}", i + 1))
            .collect::<Vec<_>>()
            .join("\n"),
        AcceptanceCriteria::Typed(items) => items
            .iter()
            .map(|c| match &c.test_command {
                Some(cmd) => format!("- {} ({}): {}\n  test: `{cmd}`", c.id, c.text, c.text),
                None => format!("- {} ({})", c.id, c.text),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Builds the fresh-attempt prompt (spec.md §4.8 step 8, first bullet):
/// principles, optional user-customized principles, the story block, then
/// implementation instructions.
pub fn build_fresh_prompt(story: &UserStory, user_principles: Option<&str>) -> String {
    let mut sections = vec![BASE_PRINCIPLES.to_string()];
    if let Some(extra) = user_principles {
        if !extra.trim().is_empty() {
            sections.push(format!("## Project-specific principles\n{}", extra.trim()));
        }
    }

    sections.push(format!(
        "## Story {}\n**{}**\n\n{}\n\n### Acceptance criteria\n{}\n\n### Complexity\n{:?}",
        story.id,
        story.title,
        story.description,
        acceptance_criteria_block(&story.acceptance_criteria),
        story.complexity,
    ));

    sections.push(
        "## Implementation instructions\n\
        Implement this story completely. Run the acceptance criteria test \
        commands yourself before finishing if possible. When you believe the \
        story is complete and every acceptance criterion is satisfied, end \
        your turn."
            .to_string(),
    );

    sections.join("\n\n")
}

/// Builds the resume-attempt prompt (spec.md §4.8 step 8, second bullet): a
/// shorter prompt naming the story and the prior passing/failing AC ids,
/// directing the agent to continue only on failing ACs.
pub fn build_resume_prompt(story: &UserStory, progress: &StoryProgress) -> String {
    format!(
        "## Resuming story {}\n**{}**\n\n{}\n\nPreviously passing acceptance criteria \
        (do not redo): {}\n\nStill failing acceptance criteria (focus here): {}\n\n\
        Continue only on the failing acceptance criteria above. When every one \
        of them passes, end your turn.",
        story.id,
        story.title,
        story.description,
        if progress.passing_acs.is_empty() {
            "(none yet)".to_string()
        } else {
            progress.passing_acs.join(", ")
        },
        if progress.failing_acs.is_empty() {
            "(none recorded)".to_string()
        } else {
            progress.failing_acs.join(", ")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_types::Complexity;

    fn sample_story() -> UserStory {
        UserStory {
            id: "US-001".into(),
            title: "Create file hello.txt".into(),
            description: "Create a file hello.txt at project root with the text hi".into(),
            acceptance_criteria: AcceptanceCriteria::Text(vec!["hello.txt exists".into()]),
            complexity: Complexity::Simple,
            priority: 1,
            passes: false,
            skipped: None,
        }
    }

    #[test]
    fn fresh_prompt_includes_principles_and_story() {
        let prompt = build_fresh_prompt(&sample_story(), None);
        assert!(prompt.contains("Coding principles"));
        assert!(prompt.contains("US-001"));
        assert!(prompt.contains("hello.txt exists"));
    }

    #[test]
    fn fresh_prompt_includes_user_principles_when_present() {
        let prompt = build_fresh_prompt(&sample_story(), Some("Always write tests first."));
        assert!(prompt.contains("Project-specific principles"));
        assert!(prompt.contains("Always write tests first."));
    }

    #[test]
    fn resume_prompt_lists_failing_acs_and_omits_principles() {
        let mut progress = StoryProgress::new("US-001");
        progress.passing_acs = vec!["AC-1".into()];
        progress.failing_acs = vec!["AC-2".into()];
        let prompt = build_resume_prompt(&sample_story(), &progress);
        assert!(!prompt.contains("Coding principles"));
        assert!(prompt.contains("AC-1"));
        assert!(prompt.contains("AC-2"));
        assert!(prompt.contains("Resuming story US-001"));
    }
}
