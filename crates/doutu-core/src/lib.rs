//! Core domain + application logic for the doutu meme bot.
//!
//! This crate is framework-agnostic. The WeChat protocol, the meme search site
//! and the QR web page live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod keyword;
pub mod logging;
pub mod login;
pub mod media_cache;
pub mod messaging;
pub mod ports;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod fakes;

pub use errors::{Error, Result};
