//! Telegram transport: outbound alerts and the `/status` and `/report` commands.

pub mod commands;
pub mod format;
pub mod notifier;

pub use commands::{start_bot, BotDeps, Command};
pub use notifier::TelegramNotifier;
