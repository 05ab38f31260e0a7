use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    dispatcher::Dispatcher,
    messaging::{
        filter::MessageFilter,
        port::ChatClient,
        types::{IncomingMessage, MessageKind, Reply},
    },
    Result,
};

/// The dispatcher's subscription to the inbound message stream.
///
/// Messages are handled one at a time on the pump's task, so a slow reply
/// delays the next message.
pub struct MessagePump {
    chat: Arc<dyn ChatClient>,
    filter: MessageFilter,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
}

impl MessagePump {
    /// Subscribe `dispatcher` to text messages, the bot's own included
    /// (self-sent messages carry the admin commands).
    pub fn new(chat: Arc<dyn ChatClient>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            chat,
            filter: MessageFilter::any()
                .kind(MessageKind::Text)
                .include_self(true),
            dispatcher,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the session ends, receiving fails, or the token is cancelled.
    pub async fn run(self) -> Result<()> {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Message pump cancelled");
                    return Ok(());
                }
                next = self.chat.recv() => next,
            };

            let Some(msg) = next? else {
                tracing::info!("Chat session ended");
                return Ok(());
            };

            if !self.filter.matches(&msg) {
                continue;
            }

            if let Err(e) = self.handle(&msg).await {
                tracing::warn!(chat = %msg.chat().name, error = %e, "Failed to handle message");
            }
        }
    }

    async fn handle(&self, msg: &IncomingMessage) -> Result<()> {
        match self.dispatcher.dispatch(msg).await? {
            Some(Reply::Text(text)) => self.chat.reply_text(msg, &text).await,
            Some(Reply::Image { ext, media_id }) => {
                self.chat.reply_image(msg, &ext, &media_id).await
            }
            None => Ok(()),
        }
    }
}
