use std::{io::IsTerminal, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn};

use directory_lookup::{
    cli::{Cli, Command, DirectorySource, TcpServerArgs, UdpServerArgs},
    client,
    datagram::DatagramService,
    directory::Directory,
    listener::Listener,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::ServeTcp(args) => serve_tcp(args).await?,
        Command::ServeUdp(args) => serve_udp(args).await?,
        Command::ClientTcp(args) => client::run_tcp(args).await?,
        Command::ClientUdp(args) => client::run_udp(args).await?,
    }

    Ok(())
}

async fn serve_tcp(args: TcpServerArgs) -> Result<()> {
    let directory = load_directory(&args.source)?;
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    let listener = Listener::new(listener, directory, args.session_options());
    info!("tcp listener listening on {}", listener.local_addr()?);

    if let Err(err) = listener.run_until_ctrl_c().await {
        warn!("listener exited with error: {err:?}");
        return Err(err);
    }
    info!("tcp listener stopped");
    Ok(())
}

async fn serve_udp(args: UdpServerArgs) -> Result<()> {
    let directory = load_directory(&args.source)?;
    let socket = UdpSocket::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    let service = DatagramService::new(socket, directory, args.identifiers);
    info!("udp service listening on {}", service.local_addr()?);

    if let Err(err) = service.run_until_ctrl_c().await {
        warn!("datagram service exited with error: {err:?}");
        return Err(err);
    }
    info!("udp service stopped");
    Ok(())
}

fn load_directory(source: &DirectorySource) -> Result<Arc<Directory>> {
    let directory = source.load()?;
    info!(
        groups = directory.group_count(),
        members = directory.member_count(),
        "directory loaded"
    );
    Ok(Arc::new(directory))
}
