//! HTTP surface of the bot: `GET /` starts (or joins) the QR login and
//! renders the QR code of the current session.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use doutu_core::{
    errors::Error,
    login::{LoginController, QrObserver},
};

const QR_BASE: &str = "http://login.weixin.qq.com/qrcode";

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct WebState {
    /// One controller for the process; every request joins the same login.
    pub login: Arc<dyn LoginController>,
    /// Observer handed to the controller on the first request.
    pub observer: Option<QrObserver>,
}

impl WebState {
    pub fn new(login: Arc<dyn LoginController>) -> Self {
        Self {
            login,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: QrObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

pub fn router(state: WebState) -> Router {
    Router::new().route("/", get(qr_page)).with_state(state)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(addr: SocketAddr, state: WebState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind QR endpoint to {addr}"))?;

    tracing::info!("QR endpoint listening on http://{addr}/");

    axum::serve(listener, router(state))
        .await
        .context("QR endpoint server error")?;
    Ok(())
}

async fn qr_page(State(state): State<WebState>) -> Response {
    match state.login.begin_login(state.observer.clone()).await {
        Ok(uuid) => Html(format!("<img src={QR_BASE}/{uuid} />")).into_response(),
        Err(e @ Error::UuidUnavailable { .. }) => {
            tracing::warn!(error = %e, "No QR code to show");
            (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Login could not start");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
