//! Broadcast dispatch module.
//!
//! Sends every CSV row to every group the account belongs to,
//! honouring Telegram flood waits and the configured row delay.

mod dispatcher;
mod policy;
mod progress;
mod target;

pub use dispatcher::{BroadcastReport, Dispatcher};
pub use policy::{FloodDecision, FloodWaitPolicy};
pub use progress::{MemorySink, ProgressSink, TerminalSink};
pub use target::{Group, MessagingClient, Payload, SendKind};
