use std::fmt;

/// Opaque id of one QR login attempt, minted by the remote login service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionUuid(pub String);

impl fmt::Display for SessionUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote user name of a contact or group (WeChat `UserName`, e.g. `@abc` / `@@def`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn is_group(&self) -> bool {
        self.0.starts_with("@@")
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat (contact or group) together with its display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatRef {
    pub id: ChatId,
    pub name: String,
}

impl ChatRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ChatId(id.into()),
            name: name.into(),
        }
    }
}

/// Token returned by the remote service after an upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaId(pub String);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The logged-in account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub user: ChatRef,
}
