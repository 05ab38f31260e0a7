use crate::domain::{ChatRef, MediaId};

/// Kind of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Emoticon,
    App,
    System,
    Other(u32),
}

impl MessageKind {
    /// Map a web WeChat `MsgType`.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Text,
            3 => Self::Image,
            34 => Self::Voice,
            47 => Self::Emoticon,
            49 => Self::App,
            10000 | 10002 => Self::System,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub kind: MessageKind,
    pub sender: ChatRef,
    pub receiver: ChatRef,
    pub text: String,
    /// The bot account was @-mentioned.
    pub is_at: bool,
    /// Sent by the bot account itself (from another device).
    pub from_self: bool,
}

impl IncomingMessage {
    /// The conversation this message belongs to.
    pub fn chat(&self) -> &ChatRef {
        if self.from_self {
            &self.receiver
        } else {
            &self.sender
        }
    }
}

/// What the dispatcher wants sent back. At most one per message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Image { ext: String, media_id: MediaId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_is_the_other_side_of_self_messages() {
        let mut msg = IncomingMessage {
            kind: MessageKind::from_code(1),
            sender: ChatRef::new("@me", "BotName"),
            receiver: ChatRef::new("@@group", "摸鱼群"),
            text: "开启自动斗图".to_string(),
            is_at: false,
            from_self: true,
        };
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.chat().id.0, "@@group");

        std::mem::swap(&mut msg.sender, &mut msg.receiver);
        msg.from_self = false;
        assert_eq!(msg.chat().id.0, "@@group");
    }

    #[test]
    fn unknown_codes_are_kept() {
        assert_eq!(MessageKind::from_code(10002), MessageKind::System);
        assert_eq!(MessageKind::from_code(62), MessageKind::Other(62));
    }
}
