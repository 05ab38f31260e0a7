use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{
    domain::SessionUuid,
    errors::Error,
    login::{Latch, LoginStatus, QrEvent},
    session::BotSession,
    Result,
};

/// Caller-supplied observer of QR status events.
pub type QrObserver = Arc<dyn Fn(&QrEvent) + Send + Sync>;

/// How a login is driven: in the caller's task, or in the background.
#[async_trait]
pub trait LoginController: Send + Sync {
    /// Start the QR login and return its session uuid.
    async fn begin_login(&self, observer: Option<QrObserver>) -> Result<SessionUuid>;

    /// Wait up to `timeout` (`None`: forever) for the login to complete.
    ///
    /// Timing out is a normal `false`, never an error.
    async fn is_logged_in(&self, timeout: Option<Duration>) -> bool;
}

/// Drives the whole handshake inside `begin_login`.
///
/// The call returns once the account is logged in, with the uuid of the
/// session that succeeded. `Error::LoginTimeout` propagates to the caller.
pub struct ForegroundLogin {
    session: Arc<BotSession>,
    logged_in: Latch<()>,
}

impl ForegroundLogin {
    pub fn new(session: Arc<BotSession>) -> Self {
        Self {
            session,
            logged_in: Latch::new(),
        }
    }
}

#[async_trait]
impl LoginController for ForegroundLogin {
    async fn begin_login(&self, observer: Option<QrObserver>) -> Result<SessionUuid> {
        let mut last_uuid = None;
        self.session
            .login(|event| {
                last_uuid = Some(event.uuid.clone());
                if let Some(obs) = &observer {
                    obs(event);
                }
            })
            .await?;
        self.logged_in.set(());

        last_uuid.ok_or_else(|| {
            Error::Protocol("login completed without reporting a session uuid".to_string())
        })
    }

    async fn is_logged_in(&self, timeout: Option<Duration>) -> bool {
        self.logged_in.wait(timeout).await.is_some()
    }
}

/// Runs the handshake on a background task and hands back the session uuid
/// as soon as the QR code is ready.
///
/// Only the first `begin_login` starts a handshake; later calls wait for the
/// same uuid (and their observer is ignored). A handshake that times out
/// before a uuid exists, or no uuid within `uuid_wait`, yields
/// `Error::UuidUnavailable`. Any other login error is returned unchanged.
pub struct BackgroundLogin {
    session: Arc<BotSession>,
    uuid_wait: Duration,
    started: AtomicBool,
    uuid: Arc<Latch<SessionUuid>>,
    logged_in: Arc<Latch<()>>,
    finished: Arc<Latch<Result<()>>>,
}

impl BackgroundLogin {
    pub fn new(session: Arc<BotSession>, uuid_wait: Duration) -> Self {
        Self {
            session,
            uuid_wait,
            started: AtomicBool::new(false),
            uuid: Arc::new(Latch::new()),
            logged_in: Arc::new(Latch::new()),
            finished: Arc::new(Latch::new()),
        }
    }

    fn spawn_login(&self, observer: Option<QrObserver>) {
        let session = self.session.clone();
        let uuid = self.uuid.clone();
        let logged_in = self.logged_in.clone();
        let finished = self.finished.clone();

        tokio::spawn(async move {
            let on_event = move |event: &QrEvent| {
                if event.status == LoginStatus::Confirmed {
                    uuid.set(event.uuid.clone());
                }
                if let Some(obs) = &observer {
                    obs(event);
                }
            };

            let outcome = session.login(on_event).await.map(|_| ());
            match &outcome {
                Ok(()) => {
                    logged_in.set(());
                }
                Err(Error::LoginTimeout { uuid, status }) => {
                    tracing::warn!(%uuid, %status, "QR login timed out");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Login failed");
                }
            }
            finished.set(outcome);
        });
    }
}

#[async_trait]
impl LoginController for BackgroundLogin {
    async fn begin_login(&self, observer: Option<QrObserver>) -> Result<SessionUuid> {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.spawn_login(observer);
        }

        let started_at = Instant::now();
        tokio::select! {
            biased;
            Some(uuid) = self.uuid.wait(None) => Ok(uuid),
            Some(outcome) = self.finished.wait(None) => match self.uuid.get() {
                // The uuid is latched before the handshake can finish.
                Some(uuid) => Ok(uuid),
                None => Err(ended_without_uuid(outcome, started_at)),
            },
            _ = tokio::time::sleep(self.uuid_wait) => Err(Error::UuidUnavailable {
                waited: self.uuid_wait,
            }),
        }
    }

    async fn is_logged_in(&self, timeout: Option<Duration>) -> bool {
        self.logged_in.wait(timeout).await.is_some()
    }
}

/// Turn a handshake that ended without surfacing a uuid into an error.
fn ended_without_uuid(outcome: Result<()>, started_at: Instant) -> Error {
    match outcome {
        Err(e) if e.is_login_timeout() => Error::UuidUnavailable {
            waited: started_at.elapsed(),
        },
        Err(e) => e,
        Ok(()) => {
            Error::Protocol("login completed without reporting a session uuid".to_string())
        }
    }
}
