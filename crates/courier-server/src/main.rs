use clap::Parser;
use courier_server::config::CourierConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier-server")]
#[command(about = "Courier long-poll delivery server")]
struct Cli {
    /// Listen address (overrides COURIER_ADDR)
    #[arg(short, long)]
    addr: Option<SocketAddr>,

    /// Data directory (overrides COURIER_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(long, conflicts_with = "data_dir")]
    in_memory: bool,

    /// Deliver new messages to the sender's own mailbox too
    #[arg(long)]
    echo_to_sender: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_server::init_tracing();
    let cli = Cli::parse();

    let mut config = CourierConfig::from_env();
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if cli.in_memory {
        config = config.in_memory();
    }
    if cli.echo_to_sender {
        config.echo_to_sender = true;
    }

    courier_server::run(config).await
}
