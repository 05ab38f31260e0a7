use std::time::Duration;

use tokio::sync::watch;

/// One-shot latch carrying a value.
///
/// Transitions exactly once from unset to set; later `set` calls are ignored.
/// Once set, every current and future waiter sees the value immediately.
#[derive(Debug)]
pub struct Latch<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Latch<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Set the latch. Returns `false` if it was already set.
    pub fn set(&self, value: T) -> bool {
        let mut value = Some(value);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        })
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the latch is set, for at most `timeout` (`None` waits forever).
    ///
    /// A zero timeout never blocks. Timing out is a normal `None` result.
    pub async fn wait(&self, timeout: Option<Duration>) -> Option<T> {
        if let Some(v) = self.get() {
            return Some(v);
        }

        let mut rx = self.tx.subscribe();
        let set = async move {
            // The sender lives in `self`, so `changed` cannot fail while we borrow it.
            rx.wait_for(Option::is_some).await.ok().and_then(|v| v.clone())
        };

        match timeout {
            None => set.await,
            Some(d) if d.is_zero() => None,
            Some(d) => tokio::time::timeout(d, set).await.ok().flatten(),
        }
    }
}

impl<T: Clone> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn zero_timeout_does_not_block() {
        let latch: Latch<()> = Latch::new();
        assert_eq!(latch.wait(Some(Duration::ZERO)).await, None);
        assert!(!latch.is_set());
    }

    #[tokio::test]
    async fn short_timeout_returns_none() {
        let latch: Latch<u32> = Latch::new();
        assert_eq!(latch.wait(Some(Duration::from_millis(20))).await, None);
    }

    #[tokio::test]
    async fn first_set_wins_and_is_seen_by_all_waiters() {
        let latch = Arc::new(Latch::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait(None).await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(latch.set("abc123".to_string()));
        assert!(!latch.set("other".to_string()));

        for w in waiters {
            assert_eq!(w.await.unwrap().as_deref(), Some("abc123"));
        }
        // Future waiters, even with a zero timeout, see the value.
        assert_eq!(
            latch.wait(Some(Duration::ZERO)).await.as_deref(),
            Some("abc123")
        );
    }
}
