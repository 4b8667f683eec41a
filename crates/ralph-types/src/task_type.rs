use serde::{Deserialize, Serialize};

/// The 14 task-type classifications a story can fall into (§4.3). Order
/// matters: it is the declared tie-break order when keyword-match totals are
/// equal, and `Unknown` is never a keyword-matched candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    ComplexIntegration,
    Mathematical,
    BackendApi,
    BackendLogic,
    FrontendUi,
    FrontendLogic,
    Database,
    Testing,
    Documentation,
    Refactoring,
    Bugfix,
    Devops,
    Config,
    Unknown,
}

impl TaskType {
    /// Declared order, leaves `Unknown` last since it is never matched by
    /// keyword count — only assigned when every other tag scores zero.
    pub const ORDER: [TaskType; 14] = [
        TaskType::ComplexIntegration,
        TaskType::Mathematical,
        TaskType::BackendApi,
        TaskType::BackendLogic,
        TaskType::FrontendUi,
        TaskType::FrontendLogic,
        TaskType::Database,
        TaskType::Testing,
        TaskType::Documentation,
        TaskType::Refactoring,
        TaskType::Bugfix,
        TaskType::Devops,
        TaskType::Config,
        TaskType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ComplexIntegration => "complex-integration",
            TaskType::Mathematical => "mathematical",
            TaskType::BackendApi => "backend-api",
            TaskType::BackendLogic => "backend-logic",
            TaskType::FrontendUi => "frontend-ui",
            TaskType::FrontendLogic => "frontend-logic",
            TaskType::Database => "database",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Refactoring => "refactoring",
            TaskType::Bugfix => "bugfix",
            TaskType::Devops => "devops",
            TaskType::Config => "config",
            TaskType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
