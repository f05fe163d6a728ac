use clap::{Parser, Subcommand};
use courier_client::{ChannelHandler, StaticIdentity, Transport, TransportConfig, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier-tail")]
#[command(about = "Follow and post to Courier conversations from the terminal")]
struct Cli {
    /// Server base URL
    #[arg(short, long, default_value = "http://localhost:3001")]
    server: String,

    /// Session token (sent as the courier_session cookie)
    #[arg(short, long, env = "COURIER_TOKEN")]
    token: Option<String>,

    /// User id to poll as
    #[arg(short, long)]
    user: String,

    /// Display name used for optimistic messages
    #[arg(short, long, default_value = "me")]
    name: String,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "2000")]
    interval_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print events as they arrive until Ctrl-C
    Tail,
    /// Send one message
    Send { conversation: String, content: String },
    /// Join a conversation
    Join { conversation: String },
    /// Leave a conversation
    Leave { conversation: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = TransportConfig::new(&cli.server)
        .with_poll_interval(Duration::from_millis(cli.interval_ms));
    if let Some(token) = &cli.token {
        config = config.with_session_token(token.clone());
    }

    let (handler, mut events) = ChannelHandler::new();
    let identity = Arc::new(StaticIdentity::signed_in(cli.user.clone(), cli.name.clone()));
    let transport = Transport::http(config, identity, Arc::new(handler))?;

    let ok = match cli.command {
        Command::Tail => {
            info!("Tailing as {} on {}", cli.user, cli.server);
            transport.connect();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Some(event) => print_event(&event),
                        None => break,
                    },
                }
            }
            transport.disconnect();
            true
        }
        Command::Send {
            conversation,
            content,
        } => transport.send_message(&conversation, &content, None).await,
        Command::Join { conversation } => transport.join_conversation(&conversation).await,
        Command::Leave { conversation } => transport.leave_conversation(&conversation).await,
    };

    if !ok {
        let reason = transport.last_error().unwrap_or_else(|| "unknown error".into());
        warn!("Request failed: {}", reason);
        anyhow::bail!(reason);
    }
    Ok(())
}

fn print_event(event: &TransportEvent) {
    match event {
        TransportEvent::Message(message) => println!(
            "[{}] {}: {}",
            message.conversation_id, message.sender.name, message.content
        ),
        TransportEvent::Reconciled { message, .. } => {
            println!("[{}] (sent) {}", message.conversation_id, message.id)
        }
        TransportEvent::SendFailed { error, .. } => println!("! send failed: {}", error),
        TransportEvent::Read(receipt) => println!(
            "[{}] {} read {}",
            receipt.conversation_id, receipt.reader_id, receipt.message_id
        ),
        TransportEvent::Joined(change) => {
            println!("[{}] {} joined", change.conversation_id, change.user_id)
        }
        TransportEvent::Left(change) => {
            println!("[{}] {} left", change.conversation_id, change.user_id)
        }
        TransportEvent::Error(message) => println!("! {}", message),
        TransportEvent::State(state) => println!("* {:?}", state),
    }
}
