//! Chat-side abstractions: the client port, the inbound message model and the
//! pump that feeds filtered messages to the dispatcher.

pub mod filter;
pub mod port;
pub mod pump;
pub mod types;
