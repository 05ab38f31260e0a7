//! Hand-written port fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{Account, ChatId, ChatRef, MediaId},
    errors::Error,
    login::QrEvent,
    messaging::{
        port::ChatClient,
        types::{IncomingMessage, Reply},
    },
    ports::MemeService,
    Result,
};

/// What `FakeChat::login` does once its scripted events are delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoginEnd {
    #[default]
    Succeed,
    /// Never completes, like a QR code nobody scans.
    Hang,
    /// The remote service refuses the login.
    Fail,
}

#[derive(Default)]
pub struct FakeChat {
    script: Mutex<Vec<QrEvent>>,
    end: Mutex<LoginEnd>,
    logins: AtomicUsize,
    inbox: Mutex<VecDeque<IncomingMessage>>,
    uploads: AtomicUsize,
    replies: Mutex<Vec<(ChatId, Reply)>>,
    fail_replies: AtomicBool,
}

impl FakeChat {
    pub fn with_login(script: Vec<QrEvent>, end: LoginEnd) -> Self {
        let chat = Self::default();
        *chat.script.lock().unwrap() = script;
        *chat.end.lock().unwrap() = end;
        chat
    }

    pub fn account() -> Account {
        Account {
            user: ChatRef::new("@me", "BotName"),
        }
    }

    pub fn push_message(&self, msg: IncomingMessage) {
        self.inbox.lock().unwrap().push_back(msg);
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn replies(&self) -> Vec<(ChatId, Reply)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn fail_replies(&self, yes: bool) {
        self.fail_replies.store(yes, Ordering::SeqCst);
    }

    fn record(&self, msg: &IncomingMessage, reply: Reply) -> Result<()> {
        if self.fail_replies.load(Ordering::SeqCst) {
            return Err(Error::External("send failed".to_string()));
        }
        self.replies
            .lock()
            .unwrap()
            .push((msg.chat().id.clone(), reply));
        Ok(())
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn login(
        &self,
        on_status: &mut (dyn FnMut(QrEvent) -> Result<()> + Send),
    ) -> Result<Account> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        for event in script {
            on_status(event)?;
            tokio::task::yield_now().await;
        }

        let end = *self.end.lock().unwrap();
        match end {
            LoginEnd::Succeed => Ok(Self::account()),
            LoginEnd::Hang => std::future::pending().await,
            LoginEnd::Fail => Err(Error::External("jslogin refused".to_string())),
        }
    }

    async fn recv(&self) -> Result<Option<IncomingMessage>> {
        Ok(self.inbox.lock().unwrap().pop_front())
    }

    async fn upload_file(&self, path: &Path) -> Result<MediaId> {
        if !path.exists() {
            return Err(Error::External(format!("missing {}", path.display())));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MediaId(format!("media-{n}")))
    }

    async fn reply_text(&self, msg: &IncomingMessage, text: &str) -> Result<()> {
        self.record(msg, Reply::Text(text.to_string()))
    }

    async fn reply_image(
        &self,
        msg: &IncomingMessage,
        ext: &str,
        media_id: &MediaId,
    ) -> Result<()> {
        self.record(
            msg,
            Reply::Image {
                ext: ext.to_string(),
                media_id: media_id.clone(),
            },
        )
    }
}

pub struct FakeMeme {
    results: Mutex<Vec<String>>,
    resolved: Mutex<Vec<String>>,
    downloads: Mutex<Vec<Vec<String>>>,
    fail_downloads: AtomicBool,
}

impl Default for FakeMeme {
    fn default() -> Self {
        Self {
            results: Mutex::new(vec!["https://img.example/1.gif".to_string()]),
            resolved: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
            fail_downloads: AtomicBool::new(false),
        }
    }
}

impl FakeMeme {
    pub fn set_results(&self, urls: Vec<String>) {
        *self.results.lock().unwrap() = urls;
    }

    pub fn fail_downloads(&self, yes: bool) {
        self.fail_downloads.store(yes, Ordering::SeqCst);
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<Vec<String>> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemeService for FakeMeme {
    async fn resolve(&self, keyword: &str) -> Result<Vec<String>> {
        self.resolved.lock().unwrap().push(keyword.to_string());
        Ok(self.results.lock().unwrap().clone())
    }

    async fn download(&self, dest: &Path, urls: &[String]) -> Result<()> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Error::External("download failed".to_string()));
        }
        self.downloads.lock().unwrap().push(urls.to_vec());
        tokio::fs::write(dest, b"GIF89a").await?;
        Ok(())
    }
}
