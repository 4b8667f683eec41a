use std::sync::OnceLock;

use regex::Regex;

use ralph_types::{TaskType, UserStory};

/// Per-tag keyword lists (spec.md §4.3: "Keyword lists are part of the
/// specification"). Ordered to match [`TaskType::ORDER`]; `Unknown` carries
/// no list since it is never keyword-matched — only assigned when every
/// other tag scores zero.
fn keywords_for(task_type: TaskType) -> &'static [&'static str] {
    use TaskType::*;
    match task_type {
        ComplexIntegration => &[
            "integration",
            "integrate",
            "end-to-end",
            "e2e",
            "pipeline",
            "orchestrate",
            "orchestration",
            "workflow",
            "multi-service",
            "cross-service",
            "saga",
        ],
        Mathematical => &[
            "algorithm",
            "math",
            "calculate",
            "calculation",
            "statistic",
            "statistical",
            "matrix",
            "formula",
            "numeric",
            "probability",
            "regression",
            "optimization",
        ],
        BackendApi => &[
            "endpoint",
            "api",
            "rest",
            "graphql",
            "route",
            "controller",
            "handler",
            "request",
            "response",
            "http",
        ],
        BackendLogic => &[
            "service",
            "business logic",
            "domain model",
            "workflow engine",
            "process",
            "validation",
            "rule engine",
            "backend",
        ],
        FrontendUi => &[
            "component",
            "button",
            "layout",
            "css",
            "stylesheet",
            "ui",
            "screen",
            "page",
            "render",
            "view",
        ],
        FrontendLogic => &[
            "state management",
            "hook",
            "store",
            "reducer",
            "context provider",
            "data binding",
            "client-side",
            "form validation",
        ],
        Database => &[
            "schema",
            "migration",
            "query",
            "table",
            "index",
            "sql",
            "database",
            "orm",
            "column",
            "transaction",
        ],
        Testing => &[
            "test",
            "spec",
            "coverage",
            "mock",
            "assert",
            "unit test",
            "integration test",
            "fixture",
            "qa",
        ],
        Documentation => &[
            "document",
            "documentation",
            "readme",
            "docs",
            "changelog",
            "guide",
            "tutorial",
            "explain",
        ],
        Refactoring => &[
            "refactor",
            "simplify",
            "clean up",
            "restructure",
            "rename",
            "extract",
            "dedupe",
            "reorganize",
        ],
        Bugfix => &[
            "bug",
            "fix",
            "crash",
            "error",
            "regression",
            "broken",
            "issue",
            "defect",
            "patch",
        ],
        Devops => &[
            "deploy",
            "ci",
            "cd",
            "docker",
            "kubernetes",
            "infrastructure",
            "provision",
            "terraform",
            "container",
        ],
        Config => &[
            "config",
            "configuration",
            "setting",
            "environment variable",
            "flag",
            "toml",
            "yaml",
            "option",
            "parameter",
        ],
        Unknown => &[],
    }
}

struct CompiledPatterns {
    by_tag: Vec<(TaskType, Vec<Regex>)>,
}

static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();

fn patterns() -> &'static CompiledPatterns {
    PATTERNS.get_or_init(|| {
        let by_tag = TaskType::ORDER
            .into_iter()
            .filter(|t| *t != TaskType::Unknown)
            .map(|tag| {
                let compiled = keywords_for(tag)
                    .iter()
                    .map(|kw| Regex::new(&format!(r"\b{}\b", regex::escape(kw))).expect("valid keyword regex"))
                    .collect();
                (tag, compiled)
            })
            .collect();
        CompiledPatterns { by_tag }
    })
}

fn count_matches(corpus: &str, patterns: &[Regex]) -> usize {
    patterns.iter().map(|re| re.find_iter(corpus).count()).sum()
}

/// `detectTaskType` (spec.md §4.3): classifies a story into one of the 14
/// task types by word-boundary-matched keyword counts, weighting title
/// matches 3× over description/AC matches. Ties broken by
/// [`TaskType::ORDER`]; an all-zero score returns `Unknown`.
pub fn detect_task_type(story: &UserStory) -> TaskType {
    let title_corpus = story.title.to_lowercase();
    let rest_corpus = format!(
        "{} {}",
        story.description.to_lowercase(),
        story.acceptance_criteria.corpus().to_lowercase()
    );

    let mut best: Option<(TaskType, usize)> = None;
    for (tag, regexes) in &patterns().by_tag {
        let title_hits = count_matches(&title_corpus, regexes);
        let rest_hits = count_matches(&rest_corpus, regexes);
        let score = title_hits * 3 + rest_hits;
        if score == 0 {
            continue;
        }
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((*tag, score)),
        }
    }
    best.map(|(tag, _)| tag).unwrap_or(TaskType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_types::{AcceptanceCriteria, Complexity};

    fn story(title: &str, description: &str) -> UserStory {
        UserStory {
            id: "US-1".into(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: AcceptanceCriteria::Text(vec!["…".into()]),
            complexity: Complexity::Simple,
            priority: 1,
            passes: false,
            skipped: None,
        }
    }

    #[test]
    fn s4_refactor_auth_module_detects_refactoring() {
        // spec.md §8 S4: "refactor"/"simplify" outweigh "service".
        let s = story(
            "Refactor auth module",
            "Simplify the JWT verification service",
        );
        assert_eq!(detect_task_type(&s), TaskType::Refactoring);
    }

    #[test]
    fn title_matches_are_weighted_three_times() {
        let s = story("Fix the bug", "This also mentions a test once");
        assert_eq!(detect_task_type(&s), TaskType::Bugfix);
    }

    #[test]
    fn all_zero_score_returns_unknown() {
        let s = story("Say hello", "Print a greeting to the console");
        assert_eq!(detect_task_type(&s), TaskType::Unknown);
    }

    #[test]
    fn database_keywords_detect_migration_work() {
        let s = story(
            "Add migration for users table",
            "Create a schema migration adding an index on the users table",
        );
        assert_eq!(detect_task_type(&s), TaskType::Database);
    }
}
