pub mod errors;
pub mod evaluator;
pub mod seed;
pub mod store;
pub mod types;
#[cfg(feature = "server")]
pub mod web;

pub use errors::AccessError;
pub use evaluator::{AdminBypass, Decision, DecisionReason, PolicyEvaluator};
#[cfg(not(target_arch = "wasm32"))]
pub use store::FileStore;
pub use store::{ConfigStore, KeyValueStore, MemoryStore};
pub use types::{AccessPolicy, ContentModule, DashboardPolicy, Level, Module, Role, User};
