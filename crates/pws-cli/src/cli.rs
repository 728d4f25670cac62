use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pws_webhooks::WebhookEvent;

#[derive(Parser)]
#[command(name = "pws-webhooks")]
#[command(about = "PWS webhooks: operator tooling for real-time server webhooks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./pws.toml when present)
    #[arg(short, long, global = true, env = "PWS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Emit one event through the dispatch engine and wait for deliveries
    Send(SendArgs),
    /// Print the signature of a webhook body
    Sign(SignArgs),
    /// Check a webhook signature against a body
    Verify(VerifyArgs),
    /// Validate the config and list apps and their webhooks
    CheckConfig,
}

#[derive(Args)]
pub struct SendArgs {
    /// Application key
    #[arg(long)]
    pub app: String,

    /// Event kind (client_event, member_added, member_removed, channel_vacated, channel_occupied)
    #[arg(long)]
    pub event: WebhookEvent,

    /// Channel name
    #[arg(long)]
    pub channel: String,

    /// User id (member events, client events on presence channels)
    #[arg(long)]
    pub user_id: Option<String>,

    /// Originating socket id (client events)
    #[arg(long)]
    pub socket_id: Option<String>,

    /// Client event name (client events)
    #[arg(long)]
    pub client_event: Option<String>,

    /// Client event data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Args)]
pub struct BodyArgs {
    /// Raw body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct SignArgs {
    /// Application secret
    #[arg(long, env = "PWS_APP_SECRET")]
    pub secret: String,

    #[command(flatten)]
    pub body: BodyArgs,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Application secret
    #[arg(long, env = "PWS_APP_SECRET")]
    pub secret: String,

    /// Value of the X-Pusher-Signature header
    #[arg(long)]
    pub signature: String,

    #[command(flatten)]
    pub body: BodyArgs,
}
