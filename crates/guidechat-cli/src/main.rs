//! Guide chat terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Live chat in room 12 (type /help for commands)
//! GUIDECHAT_TOKEN=... guidechat --user-id 7 chat 12
//!
//! # Room directory
//! guidechat rooms
//!
//! # Follow a room by polling instead of the live socket
//! guidechat watch 12
//! ```

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use guidechat_app::{RoomSession, Runtime};
use guidechat_cli::{TerminalDriver, commands, input::HELP};
use guidechat_client::{ClientConfig, DEFAULT_API_URL, DEFAULT_WS_URL, HttpApi, TokenStore};
use guidechat_core::BearerToken;
use guidechat_proto::{RoomId, UserId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Guide chat terminal client
#[derive(Parser, Debug)]
#[command(name = "guidechat")]
#[command(about = "Terminal client for guide chat rooms")]
#[command(version)]
struct Args {
    /// REST base URL
    #[arg(long, env = "GUIDECHAT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Broker WebSocket URL
    #[arg(long, env = "GUIDECHAT_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// Access token
    #[arg(long, env = "GUIDECHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Signed-in user id
    #[arg(long, env = "GUIDECHAT_USER_ID")]
    user_id: Option<UserId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List your chat rooms
    Rooms {
        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Open a room with a guide, or reuse the existing one
    Start {
        /// Guide to talk to
        guide_id: UserId,
    },

    /// Delete a room
    Delete {
        /// Room to delete
        room_id: RoomId,
    },

    /// Post one message over REST
    Send {
        /// Target room
        room_id: RoomId,
        /// Message text
        message: String,
    },

    /// Follow a room by polling its messages
    Watch {
        /// Room to follow
        room_id: RoomId,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 3000, value_parser = clap::value_parser!(u64).range(100..))]
        interval_ms: u64,
    },

    /// Live chat over the broker
    Chat {
        /// Room to open on start
        room_id: Option<RoomId>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Chat output owns stdout
    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = ClientConfig::new(args.api_url, args.ws_url);
    let tokens = Arc::new(TokenStore::new(args.token.map(BearerToken::new)));
    let api = HttpApi::new(&config, tokens.clone())?;
    let mut out = io::stdout();

    match args.command {
        Command::Rooms { cursor } => commands::rooms(&api, cursor.as_deref(), &mut out).await?,
        Command::Start { guide_id } => {
            let user_id = args.user_id.ok_or("--user-id is required to start a room")?;
            commands::start(&api, guide_id, user_id, &mut out).await?;
        },
        Command::Delete { room_id } => commands::delete(&api, room_id, &mut out).await?,
        Command::Send { room_id, message } => commands::post(&api, room_id, &message, &mut out).await?,
        Command::Watch { room_id, interval_ms } => {
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let interval = Duration::from_millis(interval_ms);
            commands::watch(&api, room_id, args.user_id, interval, &mut out, shutdown).await?;
        },
        Command::Chat { room_id } => {
            tracing::info!(api = %config.api_url, ws = %config.ws_url, "starting chat");

            let driver = TerminalDriver::new(Arc::new(api), config.ws_url.clone());
            match room_id {
                Some(room_id) => driver.select_room(room_id),
                None => writeln!(out, "{HELP}")?,
            }

            let mut session = RoomSession::new(config.connection.clone(), tokens);
            if let Some(user_id) = args.user_id {
                session = session.with_user(user_id);
            }

            Runtime::new(driver, session).run().await?;
        },
    }

    Ok(())
}
