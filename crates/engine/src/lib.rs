pub mod config;
pub mod dispatcher;
pub mod lifecycle;
pub mod okx;
pub mod retrying;
pub mod store;

pub use config::BotConfig;
pub use dispatcher::{CycleKind, Dispatcher, DispatcherState, Suppression};
pub use lifecycle::{Engine, EngineHandle};
pub use okx::OkxClient;
pub use retrying::RetryingExchange;
pub use store::SqliteStore;
