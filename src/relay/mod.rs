//! Relay decision and event dispatch.
//!
//! ```text
//!  mpsc<SessionEvent> ──► Dispatcher ──lifecycle──► ReconnectionController
//!                              │
//!                           message
//!                              ▼
//!                     mpsc<IncomingMessage> ──► relay worker ──► RelayEngine::handle
//! ```
//!
//! Lifecycle events never wait behind a slow delivery, while messages are
//! processed strictly one at a time in arrival order.

mod dispatcher;
mod engine;

pub use dispatcher::{Dispatcher, RELAY_QUEUE_CAPACITY};
pub use engine::RelayEngine;
