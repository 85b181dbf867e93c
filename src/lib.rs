//! WhatsApp → Slack message relay.
//!
//! Messages arriving on allow-listed WhatsApp conversations are posted to a
//! Slack incoming webhook. A dashboard manages the allow-list over HTTP or a
//! websocket and watches session and delivery events in real time.
//!
//! ```text
//!  bridge daemon ──SSE──► session::bridge ──► relay::Dispatcher ──► session::controller
//!                                                   │
//!                                                   ▼
//!                          selection ◄── relay::RelayEngine ──► delivery ──► Slack
//!                                                   │
//!                                                   ▼
//!                       dashboard ◄──ws── server ◄── fanout::EventHub
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod relay;
pub mod selection;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_support;

pub use app::RelayApp;
pub use config::RelayConfig;
pub use error::{Error, Result};
