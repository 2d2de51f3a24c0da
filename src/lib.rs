//! Group Broadcaster Library
//!
//! A Telegram userbot that sends CSV-driven messages to every group
//! the account belongs to.
//!
//! This crate provides the core functionality for:
//! - Loading the persisted run configuration and CSV rows
//! - Connecting to Telegram via `MTProto`
//! - Dispatching each row to every group with flood wait recovery
//! - Reporting progress line by line

pub mod broadcast;
pub mod config;
pub mod telegram;
