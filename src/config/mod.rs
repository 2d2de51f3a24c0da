//! Configuration module for the broadcaster.
//!
//! Handles the persisted operator record, Telegram API credentials,
//! and reading broadcast rows from CSV files.

mod rows;
mod settings;

pub use rows::{IMAGE_COLUMN, MESSAGE_COLUMN, Row, RowError, RowReader};
pub use settings::{ConfigError, DEFAULT_DELAY_SECS, RunConfig, TelegramConfig};
