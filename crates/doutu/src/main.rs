use std::{path::PathBuf, sync::Arc};

use anyhow::Context;

use doutu_core::{
    config::{Config, LoginMode},
    login::{BackgroundLogin, ForegroundLogin, LoginController, LoginStatus, QrEvent, QrObserver},
    session::BotSession,
};
use doutu_meme::MemeClient;
use doutu_web::WebState;
use doutu_wechat::WechatClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    doutu_core::logging::init("doutu")?;

    let cfg = Config::load()?;
    if let Some(name) = &cfg.bot_name {
        tracing::info!(bot = %name, "Starting");
    }

    let chat = Arc::new(WechatClient::new(cfg.http_timeout)?);
    let meme = Arc::new(MemeClient::new(
        cfg.meme_search_url.clone(),
        cfg.meme_max_candidates,
        cfg.http_timeout,
    )?);
    let session = Arc::new(BotSession::new(&cfg, chat, meme));

    match cfg.login_mode {
        LoginMode::Web => run_web(&cfg, session).await,
        LoginMode::Terminal => run_terminal(&cfg, session).await,
    }
}

/// Serve the QR page; the first request starts the login in the background.
async fn run_web(cfg: &Config, session: Arc<BotSession>) -> anyhow::Result<()> {
    let login: Arc<dyn LoginController> =
        Arc::new(BackgroundLogin::new(session.clone(), cfg.uuid_wait));
    let observer: QrObserver = Arc::new(|event: &QrEvent| {
        tracing::info!(uuid = %event.uuid, status = event.status.code(), "QR status");
    });
    let state = WebState::new(login).with_observer(observer);

    tokio::select! {
        res = doutu_web::serve(cfg.http_addr, state) => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }
    session.shutdown();
    Ok(())
}

/// Log in from the terminal: the QR image is written to `cfg.qr_path`.
async fn run_terminal(cfg: &Config, session: Arc<BotSession>) -> anyhow::Result<()> {
    let login = ForegroundLogin::new(session.clone());
    let observer = qr_file_observer(cfg.qr_path.clone());

    let uuid = tokio::select! {
        res = login.begin_login(Some(observer)) => res.context("login failed")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted before login");
            return Ok(());
        }
    };
    tracing::info!(%uuid, "Serving messages, Ctrl-C to stop");

    tokio::select! {
        _ = session.wait_closed(None) => tracing::info!("Session closed"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }
    session.shutdown();
    Ok(())
}

fn qr_file_observer(path: PathBuf) -> QrObserver {
    Arc::new(move |event: &QrEvent| {
        if event.status == LoginStatus::Confirmed {
            match std::fs::write(&path, &event.qr_image) {
                Ok(()) => tracing::info!(path = %path.display(), "Scan the QR code to log in"),
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to write QR code"),
            }
        } else {
            tracing::info!(uuid = %event.uuid, status = event.status.code(), "QR status");
        }
    })
}
