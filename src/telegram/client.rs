//! Telegram client wrapper for group broadcasting.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::message::InputMessage;
use grammers_client::peer::Peer;
use grammers_client::{Client, InvocationError, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{Group, MessagingClient, Payload};
use crate::config::TelegramConfig;

/// RPC errors that carry a mandatory wait in seconds.
const FLOOD_WAIT_ERRORS: [&str; 2] = ["FLOOD_WAIT", "FLOOD_PREMIUM_WAIT"];

/// Image extensions sent as photos; anything else goes out as a document.
const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Group {0} is not in the loaded roster")]
    UnknownGroup(i64),

    #[error("Failed to upload {path}: {reason}")]
    Upload { path: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        if let InvocationError::Rpc(rpc) = &err
            && FLOOD_WAIT_ERRORS.contains(&rpc.name.as_str())
            && let Some(seconds) = rpc.value
        {
            return Self::FloodWait(seconds);
        }

        let err_str = err.to_string();
        match flood_wait_from_text(&err_str) {
            Some(seconds) => Self::FloodWait(seconds),
            None => Self::Invocation(err_str),
        }
    }
}

/// Classifies a failed upload, keeping flood waits recognizable.
///
/// grammers reports upload failures as `io::Error`, wrapping the
/// `InvocationError` when the server rejected a file part.
fn upload_error(path: &Path, err: io::Error) -> TelegramError {
    let reason = err.to_string();

    if let Some(inner) = err.into_inner()
        && let Ok(invocation) = inner.downcast::<InvocationError>()
    {
        let err = TelegramError::from(*invocation);
        if matches!(err, TelegramError::FloodWait(_)) {
            return err;
        }
    }

    match flood_wait_from_text(&reason) {
        Some(seconds) => TelegramError::FloodWait(seconds),
        None => TelegramError::Upload {
            path: path.display().to_string(),
            reason,
        },
    }
}

/// Looks for a flood wait in error text that mentions one.
fn flood_wait_from_text(err_msg: &str) -> Option<u32> {
    if err_msg.to_ascii_lowercase().contains("flood") {
        extract_flood_wait_seconds(err_msg)
    } else {
        None
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["flood_wait_", "flood wait ", "(value: "];
    // ASCII lowering keeps byte offsets valid for slicing
    let lower = err_msg.to_ascii_lowercase();

    for pattern in patterns {
        if let Some(idx) = lower.find(pattern) {
            let start = idx + pattern.len();
            let num_str: String = lower[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Peers of the last loaded roster, keyed by group id.
    peers: RwLock<HashMap<i64, Peer>>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn connect(config: &TelegramConfig) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            peers: RwLock::new(HashMap::new()),
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Walks every dialog and keeps the groups, caching their peers for sending.
    async fn fetch_groups(&self) -> Result<Vec<Group>, TelegramError> {
        if !self.is_authorized().await? {
            return Err(TelegramError::NotAuthorized);
        }

        debug!("Iterating dialogs...");

        let mut groups = Vec::new();
        let mut peers = HashMap::new();
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs.next().await? {
            let peer = dialog.peer();

            // Basic groups and megagroups only; broadcast channels are `Peer::Channel`
            if !matches!(peer, Peer::Group(_)) {
                continue;
            }

            let id = peer.id().bot_api_dialog_id_unchecked();
            let name = peer.name().unwrap_or("Unnamed group").to_owned();
            debug!("Found group {} ({})", name, id);

            peers.insert(id, peer.clone());
            groups.push(Group::new(id, name));
        }

        *self.peers.write().await = peers;
        Ok(groups)
    }

    /// Builds the outgoing message, uploading the attachment if there is one.
    async fn build_message(&self, payload: &Payload) -> Result<InputMessage, TelegramError> {
        match payload {
            Payload::Text { message } => Ok(InputMessage::new().markdown(message)),
            Payload::Media { path, caption } => {
                debug!("Uploading {}", path.display());
                let uploaded = self
                    .client
                    .upload_file(path)
                    .await
                    .map_err(|e| upload_error(path, e))?;

                let message = InputMessage::new().markdown(caption);
                Ok(if is_photo(path) {
                    message.photo(uploaded)
                } else {
                    message.document(uploaded)
                })
            }
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl MessagingClient for TelegramBot {
    async fn load_groups(&self) -> Result<Vec<Group>, TelegramError> {
        self.fetch_groups().await
    }

    async fn send(&self, group: &Group, payload: &Payload) -> Result<(), TelegramError> {
        let peer = self
            .peers
            .read()
            .await
            .get(&group.id)
            .cloned()
            .ok_or(TelegramError::UnknownGroup(group.id))?;

        let message = self.build_message(payload).await?;

        debug!(
            "Sending to {}: \"{}\"",
            group.name,
            truncate_for_log(payload.text(), 30)
        );

        match self.client.send_message(&peer, message).await {
            Ok(_message) => Ok(()),
            Err(e) => {
                let err: TelegramError = e.into();
                if let TelegramError::FloodWait(seconds) = &err {
                    warn!("Flood wait triggered: {} seconds", seconds);
                }
                Err(err)
            }
        }
    }

    fn disconnect(&self) {
        Self::disconnect(self);
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot").finish_non_exhaustive()
    }
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PHOTO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}

/// Truncates a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use grammers_client::sender::RpcError;

    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+1234567890"), "***7890");
        assert_eq!(mask_phone("123"), "****");
        assert_eq!(mask_phone("+7 (999) 123-45-67"), "***4567");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("Hello", 10), "Hello");
        assert_eq!(truncate_for_log("Hello, World!", 5), "Hello...");
    }

    #[test]
    fn test_extract_flood_wait() {
        assert_eq!(extract_flood_wait_seconds("FLOOD_WAIT_120"), Some(120));
        assert_eq!(extract_flood_wait_seconds("flood wait 60 seconds"), Some(60));
        assert_eq!(
            extract_flood_wait_seconds(
                "rpc error 420: FLOOD_WAIT caused by messages.sendMessage (value: 35)"
            ),
            Some(35)
        );
        assert_eq!(extract_flood_wait_seconds("some other error"), None);
    }

    #[test]
    fn test_extract_flood_wait_non_ascii_text() {
        assert_eq!(extract_flood_wait_seconds("İİİİ flood wait 5"), Some(5));
        assert_eq!(extract_flood_wait_seconds("Ошибка: FLOOD_WAIT_17"), Some(17));
    }

    #[test]
    fn test_flood_wait_from_text_needs_flood_mention() {
        assert_eq!(
            flood_wait_from_text("rpc error 420: SLOWMODE_WAIT caused by messages.sendMessage (value: 30)"),
            None
        );
        assert_eq!(
            flood_wait_from_text("rpc error 420: FLOOD_PREMIUM_WAIT caused by upload.saveFilePart (value: 8)"),
            Some(8)
        );
    }

    fn rpc_error(name: &str, value: Option<u32>) -> InvocationError {
        InvocationError::Rpc(RpcError {
            code: 420,
            name: name.to_owned(),
            value,
            caused_by: None,
        })
    }

    #[test]
    fn test_rpc_flood_wait_classified() {
        assert!(matches!(
            TelegramError::from(rpc_error("FLOOD_WAIT", Some(35))),
            TelegramError::FloodWait(35)
        ));
        assert!(matches!(
            TelegramError::from(rpc_error("FLOOD_PREMIUM_WAIT", Some(35))),
            TelegramError::FloodWait(35)
        ));
        assert!(matches!(
            TelegramError::from(rpc_error("CHAT_WRITE_FORBIDDEN", None)),
            TelegramError::Invocation(_)
        ));
    }

    #[test]
    fn test_upload_flood_wait_classified() {
        let path = Path::new("banner.png");

        let wrapped = io::Error::other(rpc_error("FLOOD_WAIT", Some(12)));
        assert!(matches!(
            upload_error(path, wrapped),
            TelegramError::FloodWait(12)
        ));

        let text_only = io::Error::other(
            "rpc error 420: FLOOD_WAIT caused by upload.saveFilePart (value: 9)",
        );
        assert!(matches!(
            upload_error(path, text_only),
            TelegramError::FloodWait(9)
        ));

        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert!(matches!(
            upload_error(path, missing),
            TelegramError::Upload { .. }
        ));
    }

    #[test]
    fn test_is_photo() {
        assert!(is_photo(Path::new("promo.JPG")));
        assert!(is_photo(Path::new("dir/banner.png")));
        assert!(!is_photo(Path::new("flyer.pdf")));
        assert!(!is_photo(Path::new("noext")));
    }

    #[test]
    fn test_flood_wait_display() {
        assert_eq!(
            TelegramError::FloodWait(42).to_string(),
            "Flood wait required: 42 seconds"
        );
    }
}
