//! Broadcast targets and the messaging client seam.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::Row;
use crate::telegram::TelegramError;

/// A group the account belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Peer id used for addressing.
    pub id: i64,

    /// Display name, only used for reporting.
    pub name: String,
}

impl Group {
    /// Creates a group entry.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// What kind of send a payload performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// Image with the message as caption.
    Media,
    /// Message text only.
    Text,
}

/// A single send, ready to hand to the client. Text is markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Upload the file at `path` with `caption`.
    Media { path: PathBuf, caption: String },
    /// Plain message.
    Text { message: String },
}

impl Payload {
    /// Builds the payload for a row, checking the image path now.
    ///
    /// A missing image downgrades the row to a text send.
    #[must_use]
    pub fn for_row(row: &Row) -> Self {
        match row.attachment() {
            Some(path) => Self::Media {
                path: path.to_path_buf(),
                caption: row.message.clone(),
            },
            None => Self::Text {
                message: row.message.clone(),
            },
        }
    }

    /// Whether this is a media or a text send.
    #[must_use]
    pub fn kind(&self) -> SendKind {
        match self {
            Self::Media { .. } => SendKind::Media,
            Self::Text { .. } => SendKind::Text,
        }
    }

    /// The message text, whether body or caption.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Media { caption, .. } => caption,
            Self::Text { message } => message,
        }
    }
}

/// An authorized session able to list groups and send to them.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Lists the groups the account belongs to, in dialog order.
    async fn load_groups(&self) -> Result<Vec<Group>, TelegramError>;

    /// Sends a payload to a group.
    ///
    /// A rate limit must be reported as [`TelegramError::FloodWait`].
    async fn send(&self, group: &Group, payload: &Payload) -> Result<(), TelegramError>;

    /// Releases the session. Called once when a broadcast ends.
    fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_with_existing_image_is_media() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let row = Row::new(2, "caption", image.path().to_str());

        let payload = Payload::for_row(&row);
        assert_eq!(payload.kind(), SendKind::Media);
        assert_eq!(payload.text(), "caption");
    }

    #[test]
    fn test_payload_with_missing_image_is_text() {
        let row = Row::new(2, "Bye", Some("missing.png"));
        assert_eq!(
            Payload::for_row(&row),
            Payload::Text {
                message: "Bye".to_owned()
            }
        );
    }
}
