//! Broadcast dispatch loop.
//!
//! The dispatcher runs a single sequential loop:
//! 1. Load the group roster once
//! 2. For each CSV row, send to every group in roster order
//! 3. On a flood wait, sleep for the requested time and resend to the same group
//! 4. On any other error, report it and move on to the next group
//! 5. After each row, count down the configured delay
//!
//! Nothing runs concurrently: at most one send is in flight, and waits
//! block the whole loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::policy::{FloodDecision, FloodWaitPolicy};
use super::progress::ProgressSink;
use super::target::{Group, MessagingClient, Payload, SendKind};
use crate::config::{Row, RowError};
use crate::telegram::TelegramError;

/// Counters for a finished broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Groups in the roster.
    pub groups: usize,
    /// Rows that were dispatched.
    pub rows: usize,
    /// Rows the reader could not parse.
    pub bad_rows: usize,
    /// Successful (row, group) sends.
    pub sent: usize,
    /// (row, group) pairs that failed for good.
    pub failed: usize,
    /// Flood waits honoured.
    pub flood_waits: usize,
}

/// Terminal outcome of one (row, group) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Failed,
}

/// Sends every row to every group.
pub struct Dispatcher {
    client: Arc<dyn MessagingClient>,
    sink: Arc<dyn ProgressSink>,
    delay: Duration,
    policy: FloodWaitPolicy,
}

impl Dispatcher {
    /// Creates a dispatcher with no inter-row delay and an unbounded flood wait policy.
    #[must_use]
    pub fn new(client: Arc<dyn MessagingClient>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            client,
            sink,
            delay: Duration::ZERO,
            policy: FloodWaitPolicy::default(),
        }
    }

    /// Sets the pause between CSV rows. Sub-second parts are ignored.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets how flood waits are retried.
    #[must_use]
    pub const fn with_policy(mut self, policy: FloodWaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs the broadcast and releases the session when done.
    ///
    /// # Errors
    ///
    /// Returns an error only if the group roster cannot be fetched. Send
    /// failures are reported through the sink and counted in the report.
    pub async fn run<I>(&self, rows: I) -> Result<BroadcastReport, TelegramError>
    where
        I: IntoIterator<Item = Result<Row, RowError>>,
    {
        let result = self.dispatch(rows).await;
        self.client.disconnect();
        result
    }

    async fn dispatch<I>(&self, rows: I) -> Result<BroadcastReport, TelegramError>
    where
        I: IntoIterator<Item = Result<Row, RowError>>,
    {
        let groups = match self.client.load_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                self.sink.append(&format!("❌ Failed to load groups: {e}"));
                return Err(e);
            }
        };

        let mut report = BroadcastReport {
            groups: groups.len(),
            ..BroadcastReport::default()
        };

        info!("Loaded {} groups", groups.len());
        self.sink.append(&format!("Found {} groups.", groups.len()));
        if groups.is_empty() {
            warn!("Account is not a member of any group, nothing to send");
            self.sink.append("⚠️ No groups found.");
            return Ok(report);
        }

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable row: {}", e);
                    self.sink.append(&format!("❌ Skipping unreadable row: {e}"));
                    report.bad_rows += 1;
                    continue;
                }
            };

            debug!("Dispatching line {} to {} groups", row.line, groups.len());
            report.rows += 1;

            for group in &groups {
                match self.deliver(&row, group, &mut report).await {
                    Delivery::Sent => report.sent += 1,
                    Delivery::Failed => report.failed += 1,
                }
            }

            self.pause_between_rows().await;
        }

        info!(
            "Broadcast finished: {} rows, {} sent, {} failed, {} flood waits",
            report.rows, report.sent, report.failed, report.flood_waits
        );
        self.sink.append("✅ All messages sent!");

        Ok(report)
    }

    /// Sends one row to one group, resending after flood waits.
    async fn deliver(&self, row: &Row, group: &Group, report: &mut BroadcastReport) -> Delivery {
        let mut retries = 0;

        loop {
            let payload = Payload::for_row(row);

            match self.client.send(group, &payload).await {
                Ok(()) => {
                    self.sink.append(&match payload.kind() {
                        SendKind::Media => format!("📤 Sent image + message to {}", group.name),
                        SendKind::Text => format!("📩 Sent message to {}", group.name),
                    });
                    return Delivery::Sent;
                }
                Err(TelegramError::FloodWait(seconds)) => {
                    match self.policy.decide(seconds, retries) {
                        FloodDecision::Retry(wait) => {
                            warn!("Flood wait on {}: {} seconds", group.name, seconds);
                            self.sink
                                .append(&format!("⏸ Flood wait: waiting {seconds}s..."));
                            report.flood_waits += 1;
                            tokio::time::sleep(wait).await;
                            retries += 1;
                        }
                        FloodDecision::GiveUp => {
                            warn!(
                                "Giving up on {} after {} retries (flood wait {}s)",
                                group.name, retries, seconds
                            );
                            self.sink.append(&format!(
                                "❌ Failed to send to {}: flood wait of {seconds}s exceeds retry policy",
                                group.name
                            ));
                            return Delivery::Failed;
                        }
                    }
                }
                Err(e) => {
                    debug!("Send to {} ({}) failed: {}", group.name, group.id, e);
                    self.sink
                        .append(&format!("❌ Failed to send to {}: {e}", group.name));
                    return Delivery::Failed;
                }
            }
        }
    }

    /// Counts down the inter-row delay, one tick per second.
    async fn pause_between_rows(&self) {
        let secs = self.delay.as_secs();
        for remaining in (1..=secs).rev() {
            let line = format!("⏳ Waiting {remaining}s before next CSV line...");
            if remaining == secs {
                self.sink.append(&line);
            } else {
                self.sink.replace_last(&line);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("delay", &self.delay)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
