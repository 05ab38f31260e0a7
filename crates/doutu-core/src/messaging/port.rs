use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{Account, MediaId},
    login::QrEvent,
    messaging::types::IncomingMessage,
    Result,
};

/// Port for the chat-protocol client (web WeChat today).
///
/// Implementations own the connection, the contact model and media transport;
/// the bot core only sees this narrow surface.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a QR-code login.
    ///
    /// Every status event is handed to `on_status`. An error returned by the
    /// callback aborts the login and is returned unchanged.
    async fn login(
        &self,
        on_status: &mut (dyn FnMut(QrEvent) -> Result<()> + Send),
    ) -> Result<Account>;

    /// Next inbound message (self-sent ones included). `None` once the session ended.
    async fn recv(&self) -> Result<Option<IncomingMessage>>;

    async fn upload_file(&self, path: &Path) -> Result<MediaId>;

    async fn reply_text(&self, msg: &IncomingMessage, text: &str) -> Result<()>;

    /// Reply with an already uploaded image; `ext` is the file extension, e.g. `.gif`.
    async fn reply_image(&self, msg: &IncomingMessage, ext: &str, media_id: &MediaId)
        -> Result<()>;
}
