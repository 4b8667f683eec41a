pub mod cli;
pub mod engine;
pub mod prompt;
pub mod session;
pub mod state;
pub mod stream;
pub mod test_support;
pub mod verify;

pub use cli::CliHealthCache;
pub use engine::Engine;
pub use session::{SessionBackend, TmuxSessionBackend};
pub use state::{EngineStatus, ProcessState};
