pub mod config;
pub mod error;
pub mod exchange;
pub mod retry;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{EventSink, ExchangeClient, LogNotifier, Notifier};
pub use retry::RetryPolicy;
pub use types::*;
