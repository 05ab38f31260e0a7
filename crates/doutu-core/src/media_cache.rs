use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    domain::MediaId,
    messaging::port::ChatClient,
    ports::MemeService,
    Result,
};

/// Memoizes `image URLs -> uploaded media id` for the lifetime of the process.
///
/// Entries are never evicted, so memory grows with the number of distinct URL
/// sets seen. The lock is not held across the download and upload: two racing
/// lookups of the same URLs may both upload, and the last one wins.
pub struct MediaCache {
    meme: Arc<dyn MemeService>,
    chat: Arc<dyn ChatClient>,
    entries: Mutex<HashMap<Vec<String>, MediaId>>,
}

impl MediaCache {
    pub fn new(meme: Arc<dyn MemeService>, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            meme,
            chat,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Media id for `urls`, downloading and uploading on first use.
    pub async fn media_id(&self, urls: &[String]) -> Result<MediaId> {
        if let Some(id) = self.entries.lock().await.get(urls) {
            return Ok(id.clone());
        }

        tracing::info!(?urls, "Uploading image");
        let id = self.upload(urls).await?;

        self.entries
            .lock()
            .await
            .insert(urls.to_vec(), id.clone());
        Ok(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn upload(&self, urls: &[String]) -> Result<MediaId> {
        // Removed from disk when `tmp` drops, success or not.
        let tmp = tempfile::Builder::new()
            .prefix("doutu-")
            .suffix(".gif")
            .tempfile()?;
        self.meme.download(tmp.path(), urls).await?;
        self.chat.upload_file(tmp.path()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeChat, FakeMeme};

    #[tokio::test]
    async fn same_urls_upload_once() {
        let meme = Arc::new(FakeMeme::default());
        let chat = Arc::new(FakeChat::default());
        let cache = MediaCache::new(meme.clone(), chat.clone());

        let urls = vec!["https://img/a.gif".to_string()];
        let first = cache.media_id(&urls).await.unwrap();
        let second = cache.media_id(&urls).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chat.uploads(), 1);
        assert_eq!(meme.downloads(), vec![urls.clone()]);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn different_url_sets_are_separate_entries() {
        let chat = Arc::new(FakeChat::default());
        let cache = MediaCache::new(Arc::new(FakeMeme::default()), chat.clone());

        let a = cache.media_id(&["u1".to_string()]).await.unwrap();
        let b = cache
            .media_id(&["u1".to_string(), "u2".to_string()])
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(chat.uploads(), 2);
    }

    #[tokio::test]
    async fn failed_download_is_not_cached() {
        let meme = Arc::new(FakeMeme::default());
        meme.fail_downloads(true);
        let chat = Arc::new(FakeChat::default());
        let cache = MediaCache::new(meme.clone(), chat.clone());

        let urls = vec!["u".to_string()];
        assert!(cache.media_id(&urls).await.is_err());
        assert_eq!(chat.uploads(), 0);

        meme.fail_downloads(false);
        cache.media_id(&urls).await.unwrap();
        assert_eq!(chat.uploads(), 1);
    }
}
