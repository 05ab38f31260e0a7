use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, Phrases},
    dispatcher::Dispatcher,
    domain::Account,
    login::{Handshake, Latch, QrEvent},
    media_cache::MediaCache,
    messaging::{port::ChatClient, pump::MessagePump},
    ports::MemeService,
    registry::GroupRegistry,
    Result,
};

/// One bot instance: the chat client, the meme service and the state shared
/// by every message handler (opt-in groups, uploaded media).
///
/// A login that times out is not retried; build a new session (and
/// controller) to try again.
pub struct BotSession {
    chat: Arc<dyn ChatClient>,
    meme: Arc<dyn MemeService>,
    phrases: Phrases,
    timeout_max: u32,
    registry: Arc<GroupRegistry>,
    cache: Arc<MediaCache>,
    cancel: CancellationToken,
    closed: Arc<Latch<()>>,
}

impl BotSession {
    pub fn new(cfg: &Config, chat: Arc<dyn ChatClient>, meme: Arc<dyn MemeService>) -> Self {
        let cache = Arc::new(MediaCache::new(meme.clone(), chat.clone()));
        Self {
            chat,
            meme,
            phrases: cfg.phrases.clone(),
            timeout_max: cfg.timeout_max,
            registry: Arc::new(GroupRegistry::new()),
            cache,
            cancel: CancellationToken::new(),
            closed: Arc::new(Latch::new()),
        }
    }

    /// Run the QR handshake, then subscribe the dispatcher to inbound messages.
    ///
    /// `on_event` sees every status event that did not end the handshake.
    /// `Error::LoginTimeout` is returned once the QR code expired; errors of
    /// the chat client pass through unchanged.
    pub async fn login(&self, mut on_event: impl FnMut(&QrEvent) + Send) -> Result<Account> {
        let mut handshake = Handshake::new(self.timeout_max);

        let result = {
            let mut guard = |event: QrEvent| -> Result<()> {
                tracing::debug!(uuid = %event.uuid, status = event.status.code(), "QR status");
                handshake.on_event(&event)?;
                on_event(&event);
                Ok(())
            };
            self.chat.login(&mut guard).await
        };

        let account = result?;
        handshake.complete();
        tracing::info!(user = %account.user.name, "Logged in");

        self.register();
        Ok(account)
    }

    /// Stop the message pump.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until the message pump stopped. `None` waits forever.
    pub async fn wait_closed(&self, timeout: Option<Duration>) -> bool {
        self.closed.wait(timeout).await.is_some()
    }

    fn register(&self) {
        let dispatcher = Arc::new(Dispatcher::new(
            self.phrases.clone(),
            self.registry.clone(),
            self.meme.clone(),
            self.cache.clone(),
        ));
        let pump =
            MessagePump::new(self.chat.clone(), dispatcher).with_cancel(self.cancel.clone());
        let closed = self.closed.clone();

        tokio::spawn(async move {
            if let Err(e) = pump.run().await {
                tracing::error!(error = %e, "Message pump stopped");
            }
            closed.set(());
        });
    }
}
