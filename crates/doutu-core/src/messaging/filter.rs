use std::collections::HashSet;

use crate::messaging::types::{IncomingMessage, MessageKind};

/// Predicate selecting which inbound messages a handler receives.
#[derive(Clone, Debug, Default)]
pub struct MessageFilter {
    /// Accepted kinds; empty accepts every kind.
    kinds: HashSet<MessageKind>,
    include_self: bool,
}

impl MessageFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Also deliver messages the bot account sent itself.
    pub fn include_self(mut self, yes: bool) -> Self {
        self.include_self = yes;
        self
    }

    pub fn matches(&self, msg: &IncomingMessage) -> bool {
        if msg.from_self && !self.include_self {
            return false;
        }
        self.kinds.is_empty() || self.kinds.contains(&msg.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatRef;

    fn msg(kind: MessageKind, from_self: bool) -> IncomingMessage {
        IncomingMessage {
            kind,
            sender: ChatRef::new("@a", "a"),
            receiver: ChatRef::new("@@g", "g"),
            text: "hi".to_string(),
            is_at: false,
            from_self,
        }
    }

    #[test]
    fn text_including_self() {
        let f = MessageFilter::any()
            .kind(MessageKind::Text)
            .include_self(true);
        assert!(f.matches(&msg(MessageKind::Text, false)));
        assert!(f.matches(&msg(MessageKind::Text, true)));
        assert!(!f.matches(&msg(MessageKind::Image, false)));
    }

    #[test]
    fn self_messages_excluded_by_default() {
        let f = MessageFilter::any();
        assert!(f.matches(&msg(MessageKind::Voice, false)));
        assert!(!f.matches(&msg(MessageKind::Text, true)));
    }
}
