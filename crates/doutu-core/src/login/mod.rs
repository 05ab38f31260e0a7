//! QR-code login: status codes, the timeout-counting handshake, one-shot
//! latches and the two login controllers built on top of them.

pub mod controller;
pub mod handshake;
pub mod latch;
pub mod status;

pub use controller::{BackgroundLogin, ForegroundLogin, LoginController, QrObserver};
pub use handshake::{Handshake, HandshakeState};
pub use latch::Latch;
pub use status::{LoginStatus, QrEvent};
