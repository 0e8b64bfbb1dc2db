//! Connectionless transport.
//!
//! Each datagram is a complete, independent exchange: there is no session to
//! keep, so `STOP_SESSION` does nothing and `STOP` ends the whole loop.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::UdpSocket, select};
use tracing::{debug, info, warn};

use crate::{
    config::IdentifierPolicy,
    directory::Directory,
    protocol::{Action, commands_in},
};

const MAX_DATAGRAM: usize = 64 * 1024;

pub struct DatagramService {
    socket: UdpSocket,
    directory: Arc<Directory>,
    identifiers: IdentifierPolicy,
}

/// What the loop should do after a datagram has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl DatagramService {
    pub fn new(
        socket: UdpSocket,
        directory: Arc<Directory>,
        identifiers: IdentifierPolicy,
    ) -> Self {
        Self {
            socket,
            directory,
            identifiers,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves datagrams until a client sends `STOP` or an empty datagram.
    ///
    /// A receive error ends the service with that error.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`DatagramService::run`], but also returns once `shutdown`
    /// completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("datagram service shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = received.context("failed to receive datagram")?;
                    if self.handle_datagram(&buf[..len], peer).await == Flow::Stop {
                        return Ok(());
                    }
                }
            }
        }
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) -> Flow {
        if payload.is_empty() {
            info!(peer = %peer, "empty datagram received, stopping");
            return Flow::Stop;
        }

        for command in commands_in(payload, self.identifiers) {
            match command.execute(&self.directory) {
                Action::Reply(reply) => self.send_reply(reply.as_bytes(), peer).await,
                Action::Shutdown => {
                    info!(peer = %peer, "shutdown requested by client");
                    return Flow::Stop;
                }
                Action::EndSession | Action::Silent => {}
            }
        }

        Flow::Continue
    }

    async fn send_reply(&self, reply: &[u8], peer: SocketAddr) {
        match self.socket.send_to(reply, peer).await {
            Ok(sent) if sent < reply.len() => {
                warn!(peer = %peer, sent, expected = reply.len(), "reply was truncated");
            }
            Ok(_) => {}
            Err(err) => debug!(peer = %peer, error = ?err, "failed to send reply"),
        }
    }
}
