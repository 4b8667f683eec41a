pub mod activity;
pub mod cost;
pub mod events;
pub mod learning;
pub mod model;
pub mod plan;
pub mod prd;
pub mod progress;
pub mod quota;
pub mod task_type;

pub use activity::*;
pub use cost::*;
pub use events::*;
pub use learning::*;
pub use model::*;
pub use plan::*;
pub use prd::*;
pub use progress::*;
pub use quota::*;
pub use task_type::*;
