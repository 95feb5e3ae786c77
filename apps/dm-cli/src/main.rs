use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use dm_client::{ClientConfig, DmSession, ServerConfig, SessionEvent};
use dm_crypto::{derive_encryption_keypair, Ed25519Identity, IdentitySigner};
use dm_proto::{DecryptedMessage, MessageContent, PublicIdentity};

mod identity;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polycentric end-to-end encrypted direct messages", long_about = None)]
struct Cli {
    /// Hex-encoded 32-byte identity seed file. Falls back to DM_IDENTITY_SEED.
    #[arg(long, global = true)]
    identity: Option<PathBuf>,

    /// Relay base URL. Overrides DM_RELAY_URL.
    #[arg(long, global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show this identity and its derived encryption key
    Keys {
        /// Create a new identity seed at --identity first
        #[arg(long)]
        generate: bool,
    },
    /// Check the relay is up
    Health,
    /// Send a text message
    Send {
        /// Recipient identity key, base64
        recipient: String,
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Print the full conversation with one party
    History {
        /// Other party's identity key, base64
        other: String,
    },
    /// List conversations (metadata only)
    Conversations,
    /// Stay connected and print incoming messages until Ctrl-C
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dm_client=info,dm_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let signer = match &cli.command {
        Commands::Keys { generate: true } => {
            let path = cli
                .identity
                .as_deref()
                .ok_or_else(|| anyhow!("--generate needs --identity <path>"))?;
            identity::generate(path)?
        }
        _ => identity::load(cli.identity.as_deref())?,
    };
    let signer = Arc::new(signer);

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.relay {
        let max = config.server.max_message_size;
        config.server = ServerConfig::from_base_url(url)?;
        config.server.max_message_size = max;
    }
    let session = DmSession::over_http(config, signer.clone())?;

    match cli.command {
        Commands::Keys { .. } => keys_command(&session, &signer),
        Commands::Health => health_command(&session).await,
        Commands::Send {
            recipient,
            text,
            reply_to,
        } => send_command(&session, &recipient, text, reply_to).await,
        Commands::History { other } => history_command(&session, &other).await,
        Commands::Conversations => conversations_command(&session).await,
        Commands::Listen => listen_command(&session).await,
    }
}

fn parse_identity(b64: &str) -> Result<PublicIdentity> {
    let key = dm_proto::b64::decode(b64.trim())
        .map_err(|e| anyhow!("identity key is not base64: {e}"))?;
    if key.len() != 32 {
        return Err(anyhow!("identity key must be 32 bytes, got {}", key.len()));
    }
    Ok(PublicIdentity::new(dm_crypto::KEY_TYPE_ED25519, key))
}

fn print_message(local: &PublicIdentity, m: &DecryptedMessage) {
    let who = if &m.sender == local {
        "me".to_string()
    } else {
        m.sender.key_b64()
    };
    let body = match &m.content {
        MessageContent::Text { text } => text.clone(),
        MessageContent::File { file_name, size, .. } => format!("[file {file_name}, {size} bytes]"),
        other => format!("[{}]", other.kind()),
    };
    println!("{} {} {}: {}", m.timestamp.to_rfc3339(), m.message_id, who, body);
}

fn keys_command(session: &DmSession, signer: &Ed25519Identity) -> Result<()> {
    let encryption = derive_encryption_keypair(&signer.private_key_bytes()[..])?;
    println!("identity:    {}", session.local_identity().key_b64());
    println!("fingerprint: {}", session.local_identity().fingerprint());
    println!("encryption:  {}", dm_proto::b64::encode(encryption.public_key()));
    println!("relay:       {}", session.config().server.http_url);
    Ok(())
}

async fn health_command(session: &DmSession) -> Result<()> {
    if session.health().await? {
        println!("relay is healthy");
        Ok(())
    } else {
        Err(anyhow!("relay reported unhealthy"))
    }
}

async fn send_command(
    session: &DmSession,
    recipient: &str,
    text: String,
    reply_to: Option<String>,
) -> Result<()> {
    let recipient = parse_identity(recipient)?;
    session.initialize().await?;
    let sent = session
        .send(&recipient, MessageContent::text(text), reply_to)
        .await?;
    println!("sent {}", sent.message_id);
    Ok(())
}

async fn history_command(session: &DmSession, other: &str) -> Result<()> {
    let other = parse_identity(other)?;
    session.initialize().await?;
    let messages = session.load_all_history(&other).await?;
    for m in &messages {
        print_message(session.local_identity(), m);
    }
    info!(count = messages.len(), "history loaded");
    Ok(())
}

async fn conversations_command(session: &DmSession) -> Result<()> {
    session.initialize().await?;
    for c in session.list_conversations().await? {
        let last = c
            .last_message
            .map(|m| format!("{} at {}", m.message_id, m.timestamp.to_rfc3339()))
            .unwrap_or_else(|| "-".into());
        println!("{}  unread={}  last={}", c.other_party.key_b64(), c.unread_count, last);
    }
    Ok(())
}

async fn listen_command(session: &DmSession) -> Result<()> {
    session.initialize().await?;
    let mut events = session.subscribe();
    session.connect().await?;
    info!(identity = %session.local_identity().fingerprint(), "listening");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::MessageReceived(m)) => print_message(session.local_identity(), &m),
                Ok(SessionEvent::Typing { from, is_typing }) => {
                    println!("{} {}", from.key_b64(), if is_typing { "is typing" } else { "stopped typing" });
                }
                Ok(SessionEvent::ReadReceipt { from, message_id }) => {
                    println!("{} read {}", from.key_b64(), message_id);
                }
                Ok(SessionEvent::ConnectionChanged { connected: false }) => {
                    return Err(anyhow!("relay closed the connection"));
                }
                Ok(SessionEvent::ConnectionChanged { connected: true }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    session.disconnect().await;
    Ok(())
}
