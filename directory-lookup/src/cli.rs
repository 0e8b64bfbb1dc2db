use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_POLL_INTERVAL, EofPolicy, IdentifierPolicy, SessionOptions},
    directory::Directory,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve lookups over TCP, one worker per connection.
    ServeTcp(TcpServerArgs),
    /// Serve lookups over UDP, one reply datagram per command.
    ServeUdp(UdpServerArgs),
    /// Query a TCP server interactively from stdin.
    ClientTcp(TcpClientArgs),
    /// Query a UDP server interactively from stdin.
    ClientUdp(UdpClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DirectorySource {
    /// Directory file to serve. Read from stdin when omitted.
    #[arg(long)]
    pub directory: Option<PathBuf>,
}

impl DirectorySource {
    pub fn load(&self) -> Result<Directory> {
        match &self.directory {
            Some(path) => Directory::load(path),
            None => Directory::from_reader(std::io::stdin().lock())
                .context("failed to read directory from stdin"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TcpServerArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub source: DirectorySource,

    /// How long each accept and read waits before re-checking for shutdown.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// What to do with unterminated input when a client closes its stream.
    #[arg(long, value_enum, default_value_t = EofPolicy::Close)]
    pub eof_policy: EofPolicy,

    /// How strictly GET identifiers are validated.
    #[arg(long, value_enum, default_value_t = IdentifierPolicy::Numeric)]
    pub identifiers: IdentifierPolicy,
}

impl TcpServerArgs {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_eof(self.eof_policy)
            .with_identifiers(self.identifiers)
    }
}

#[derive(Args, Debug, Clone)]
pub struct UdpServerArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub source: DirectorySource,

    /// How strictly GET identifiers are validated.
    #[arg(long, value_enum, default_value_t = IdentifierPolicy::Numeric)]
    pub identifiers: IdentifierPolicy,
}

#[derive(Args, Debug, Clone)]
pub struct TcpClientArgs {
    /// Address of the server to query.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct UdpClientArgs {
    /// Address of the server to query.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,

    /// How long to wait for each reply before reporting it lost.
    #[arg(long, default_value_t = 2000)]
    pub reply_timeout_ms: u64,
}
