//! Telegram client wrapper module.
//!
//! Provides high-level abstractions for interacting with Telegram,
//! including authentication, group discovery, and message sending.

mod client;

pub use client::{TelegramBot, TelegramError};
