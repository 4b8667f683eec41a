pub mod capability;
pub mod catalog;
pub mod manager;
pub mod probe;

pub use capability::get_recommended_model;
pub use catalog::{catalog, get_model, models_by_capability};
pub use manager::QuotaManager;
pub use probe::{ProbeReading, ProviderProbe};
