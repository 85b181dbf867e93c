//! Command-line arguments.
//!
//! Every flag can also be set through the environment (and `.env`), so a
//! container deployment needs no arguments at all:
//!
//! - `chat-relay` / `chat-relay run`: start the relay (default)
//! - `chat-relay config`: print the resolved configuration and exit

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "Forward messages from selected WhatsApp chats to a Slack webhook")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// HTTP port, used when the persisted config does not name one
    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,

    /// Slack incoming-webhook URL, used when the persisted config has none
    #[arg(long, env = "SLACK_WEBHOOK_URL", global = true)]
    pub slack_webhook_url: Option<String>,

    /// Persisted relay configuration (selected chats, webhook, port)
    #[arg(long, env = "RELAY_CONFIG_PATH", default_value = "config.json", global = true)]
    pub config_path: PathBuf,

    /// Base URL of the WhatsApp bridge daemon
    #[arg(
        long,
        env = "WHATSAPP_BRIDGE_URL",
        default_value = "http://127.0.0.1:3001",
        global = true
    )]
    pub bridge_url: String,

    /// Directory for WhatsApp authentication data
    #[arg(long, env = "WHATSAPP_SESSION_PATH", global = true)]
    pub session_data_path: Option<PathBuf>,

    /// Run the session browser headless (auto-detected when omitted)
    #[arg(long, env = "WHATSAPP_HEADLESS", global = true)]
    pub headless: Option<bool>,

    /// Session start attempts before giving up
    #[arg(long, default_value_t = 3, global = true)]
    pub max_retries: u32,

    /// Seconds between session start attempts
    #[arg(long, default_value_t = 5, global = true)]
    pub retry_delay_secs: u64,

    /// Seconds to wait after the HTTP server is up before starting the session
    #[arg(long, default_value_t = 2, global = true)]
    pub startup_delay_secs: u64,

    /// Directory with dashboard assets served at `/`
    #[arg(long, env = "STATIC_DIR", default_value = "public", global = true)]
    pub static_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the relay (default if no subcommand given)
    Run,

    /// Print the resolved configuration and exit
    Config,
}

impl Cli {
    /// Check if we should run the relay (default behavior or explicit `run`).
    pub fn should_run(&self) -> bool {
        matches!(self.command, None | Some(Command::Run))
    }
}
