pub mod execution_planner;
pub mod task_detector;

pub use execution_planner::{generate_plan, token_estimate, TokenEstimate};
pub use task_detector::detect_task_type;
