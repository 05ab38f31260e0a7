use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::domain::ChatId;

/// Groups that enabled @-mention auto-reply.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Mutex<HashSet<ChatId>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the group was not opted in before.
    pub async fn opt_in(&self, group: &ChatId) -> bool {
        self.groups.lock().await.insert(group.clone())
    }

    /// Returns `true` if the group was opted in and is now removed.
    pub async fn opt_out(&self, group: &ChatId) -> bool {
        self.groups.lock().await.remove(group)
    }

    pub async fn contains(&self, group: &ChatId) -> bool {
        self.groups.lock().await.contains(group)
    }

    pub async fn len(&self) -> usize {
        self.groups.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.groups.lock().await.is_empty()
    }
}
