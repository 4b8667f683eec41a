pub mod cost_tracker;
pub mod learning_recorder;

pub use cost_tracker::CostTracker;
pub use learning_recorder::LearningRecorder;
