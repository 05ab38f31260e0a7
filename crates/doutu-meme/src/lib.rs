//! Meme search adapter.
//!
//! Scrapes a keyword search page for image URLs and downloads the chosen image.

use std::{path::Path, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;

use doutu_core::{errors::Error, ports::MemeService, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct MemeClient {
    /// Search page URL with a `{keyword}` placeholder.
    search_url: String,
    max_candidates: usize,
    http: reqwest::Client,
}

impl MemeClient {
    pub fn new(
        search_url: impl Into<String>,
        max_candidates: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::External(format!("meme http client: {e}")))?;
        Ok(Self {
            search_url: search_url.into(),
            max_candidates: max_candidates.max(1),
            http,
        })
    }

    fn search_url_for(&self, keyword: &str) -> String {
        self.search_url
            .replace("{keyword}", &utf8_percent_encode(keyword, NON_ALPHANUMERIC).to_string())
    }
}

#[async_trait]
impl MemeService for MemeClient {
    async fn resolve(&self, keyword: &str) -> Result<Vec<String>> {
        let url = self.search_url_for(keyword);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::External(format!("meme search request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "meme search failed: {} for {keyword:?}",
                resp.status()
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("meme search body error: {e}")))?;

        let urls = extract_image_urls(&html, self.max_candidates);
        tracing::debug!(%keyword, found = urls.len(), "Meme search");
        Ok(urls)
    }

    async fn download(&self, dest: &Path, urls: &[String]) -> Result<()> {
        let mut last_err = None;

        for url in urls {
            match self.fetch(url).await {
                Ok(bytes) => {
                    tokio::fs::write(dest, &bytes).await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Image download failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::External("no image URL to download".to_string())))
    }
}

impl MemeClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("image request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "image download failed: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::External(format!("image body error: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::External("image body is empty".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Image URLs from a search result page, in page order, without duplicates.
///
/// Lazy-loaded `data-original` attributes are preferred over `src`, which on
/// these pages usually points at a loading placeholder.
pub fn extract_image_urls(html: &str, limit: usize) -> Vec<String> {
    static LAZY: OnceLock<Regex> = OnceLock::new();
    static SRC: OnceLock<Regex> = OnceLock::new();
    let lazy = LAZY.get_or_init(|| {
        Regex::new(r#"data-(?:original|backup|src)="([^"]+\.(?:gif|jpg|jpeg|png))""#)
            .expect("valid regex")
    });
    let src = SRC.get_or_init(|| {
        Regex::new(r#"<img[^>]+src="([^"]+\.(?:gif|jpg|jpeg|png))""#).expect("valid regex")
    });

    let mut out: Vec<String> = Vec::new();
    for re in [lazy, src] {
        for cap in re.captures_iter(html) {
            let url = absolutize(&cap[1]);
            if !out.contains(&url) {
                out.push(url);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out.truncate(limit);
    out
}

fn absolutize(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}
