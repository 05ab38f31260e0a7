use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Port for the meme search site.
#[async_trait]
pub trait MemeService: Send + Sync {
    /// Image URLs matching `keyword`, best match first. Empty when nothing matched.
    async fn resolve(&self, keyword: &str) -> Result<Vec<String>>;

    /// Fetch the first reachable URL of `urls` into `dest`.
    async fn download(&self, dest: &Path, urls: &[String]) -> Result<()>;
}
