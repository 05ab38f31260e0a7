use std::sync::Arc;

use crate::{
    config::Phrases,
    keyword::extract_keyword,
    media_cache::MediaCache,
    messaging::types::{IncomingMessage, Reply},
    ports::MemeService,
    registry::GroupRegistry,
    Result,
};

const REPLY_IMAGE_EXT: &str = ".gif";

/// Routes each inbound text message to opt-in toggling, a meme reply, or nothing.
pub struct Dispatcher {
    phrases: Phrases,
    registry: Arc<GroupRegistry>,
    meme: Arc<dyn MemeService>,
    cache: Arc<MediaCache>,
}

impl Dispatcher {
    pub fn new(
        phrases: Phrases,
        registry: Arc<GroupRegistry>,
        meme: Arc<dyn MemeService>,
        cache: Arc<MediaCache>,
    ) -> Self {
        Self {
            phrases,
            registry,
            meme,
            cache,
        }
    }

    /// Decide the reply to `msg`, if any.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Result<Option<Reply>> {
        if msg.from_self {
            if let Some(reply) = self.handle_command(msg).await {
                return Ok(Some(reply));
            }
        }

        let group = msg.chat();
        let opted_in = self.registry.contains(&group.id).await;
        let Some(keyword) = extract_keyword(&msg.text, msg.is_at, opted_in) else {
            return Ok(None);
        };

        let urls = self.meme.resolve(&keyword).await?;
        if urls.is_empty() {
            tracing::debug!(%keyword, "No image found");
            return Ok(None);
        }

        let media_id = self.cache.media_id(&urls).await?;
        tracing::info!(%keyword, %media_id, "Received keyword, reply image");
        Ok(Some(Reply::Image {
            ext: REPLY_IMAGE_EXT.to_string(),
            media_id,
        }))
    }

    async fn handle_command(&self, msg: &IncomingMessage) -> Option<Reply> {
        let group = msg.chat();

        if msg.text.contains(&self.phrases.opt_in) {
            self.registry.opt_in(&group.id).await;
            tracing::info!(group = %group.name, "Group enabled auto reply");
            return Some(Reply::Text(self.phrases.opt_in_reply.clone()));
        }

        if msg.text.contains(&self.phrases.opt_out) && self.registry.opt_out(&group.id).await {
            tracing::info!(group = %group.name, "Group disabled auto reply");
            return Some(Reply::Text(self.phrases.opt_out_reply.clone()));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatRef, MediaId},
        fakes::{FakeChat, FakeMeme},
        messaging::types::MessageKind,
    };

    struct Harness {
        dispatcher: Dispatcher,
        registry: Arc<GroupRegistry>,
        meme: Arc<FakeMeme>,
        chat: Arc<FakeChat>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(GroupRegistry::new());
        let meme = Arc::new(FakeMeme::default());
        let chat = Arc::new(FakeChat::default());
        let cache = Arc::new(MediaCache::new(meme.clone(), chat.clone()));
        let dispatcher = Dispatcher::new(
            Phrases::default(),
            registry.clone(),
            meme.clone(),
            cache,
        );
        Harness {
            dispatcher,
            registry,
            meme,
            chat,
        }
    }

    fn own(text: &str) -> IncomingMessage {
        IncomingMessage {
            kind: MessageKind::Text,
            sender: ChatRef::new("@me", "BotName"),
            receiver: ChatRef::new("@@group", "摸鱼群"),
            text: text.to_string(),
            is_at: false,
            from_self: true,
        }
    }

    fn from_group(text: &str, is_at: bool) -> IncomingMessage {
        IncomingMessage {
            kind: MessageKind::Text,
            sender: ChatRef::new("@@group", "摸鱼群"),
            receiver: ChatRef::new("@me", "BotName"),
            text: text.to_string(),
            is_at,
            from_self: false,
        }
    }

    fn group() -> crate::domain::ChatId {
        crate::domain::ChatId("@@group".to_string())
    }

    #[tokio::test]
    async fn opt_in_twice_keeps_one_membership() {
        let h = harness();
        for _ in 0..2 {
            let reply = h.dispatcher.dispatch(&own("开启自动斗图")).await.unwrap();
            assert_eq!(
                reply,
                Some(Reply::Text("已开启，@我发送文字可以自动斗图".to_string()))
            );
        }
        assert_eq!(h.registry.len().await, 1);
        assert!(h.registry.contains(&group()).await);
    }

    #[tokio::test]
    async fn opt_out_only_replies_when_removed() {
        let h = harness();
        assert_eq!(h.dispatcher.dispatch(&own("关闭自动斗图")).await.unwrap(), None);

        h.registry.opt_in(&group()).await;
        assert_eq!(
            h.dispatcher.dispatch(&own("关闭自动斗图")).await.unwrap(),
            Some(Reply::Text("已关闭".to_string()))
        );
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn commands_from_others_are_ignored() {
        let h = harness();
        let reply = h
            .dispatcher
            .dispatch(&from_group("开启自动斗图", false))
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn suffix_keyword_replies_with_gif() {
        let h = harness();
        let reply = h
            .dispatcher
            .dispatch(&from_group("foo.gif", false))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(Reply::Image {
                ext: ".gif".to_string(),
                media_id: MediaId("media-1".to_string()),
            })
        );
        assert_eq!(h.meme.resolved(), vec!["foo".to_string()]);
    }

    #[tokio::test]
    async fn own_suffix_message_also_gets_a_reply() {
        let h = harness();
        let reply = h.dispatcher.dispatch(&own("doge.jpg")).await.unwrap();
        assert!(matches!(reply, Some(Reply::Image { .. })));
        assert_eq!(h.meme.resolved(), vec!["doge".to_string()]);
    }

    #[tokio::test]
    async fn mention_needs_opted_in_group() {
        let h = harness();
        let msg = from_group("@BotName check this out", true);

        assert_eq!(h.dispatcher.dispatch(&msg).await.unwrap(), None);
        assert!(h.meme.resolved().is_empty());

        h.registry.opt_in(&group()).await;
        let reply = h.dispatcher.dispatch(&msg).await.unwrap();
        assert!(matches!(reply, Some(Reply::Image { .. })));
        assert_eq!(h.meme.resolved(), vec!["check this out".to_string()]);
    }

    #[tokio::test]
    async fn no_image_found_means_no_reply() {
        let h = harness();
        h.meme.set_results(Vec::new());
        let reply = h
            .dispatcher
            .dispatch(&from_group("nothing.gif", false))
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(h.chat.uploads(), 0);
    }

    #[tokio::test]
    async fn repeated_keyword_reuses_upload() {
        let h = harness();
        for _ in 0..3 {
            h.dispatcher
                .dispatch(&from_group("foo.gif", false))
                .await
                .unwrap();
        }
        assert_eq!(h.chat.uploads(), 1);
    }

    #[tokio::test]
    async fn plain_text_is_ignored() {
        let h = harness();
        h.registry.opt_in(&group()).await;
        let reply = h
            .dispatcher
            .dispatch(&from_group("just chatting", false))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }
}
