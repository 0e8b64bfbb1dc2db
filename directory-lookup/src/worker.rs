//! Per-connection command loop for the TCP transport.
//!
//! A worker cycles through polling, reading and executing until the client
//! ends the session, the connection fails, or the shared shutdown signal is
//! observed at a polling point.

use std::{io, net::SocketAddr, sync::Arc};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, info};

use crate::{
    config::{EofPolicy, SessionOptions},
    directory::Directory,
    protocol::{Action, Command, LineBuffer},
    shutdown::ShutdownSignal,
};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed by peer")]
    Closed,
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Why a session finished without a connection fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `STOP_SESSION`, or its input was drained at end of stream.
    StopSession,
    /// The client sent `STOP` and raised the shutdown signal.
    Stop,
    /// Another party raised the shutdown signal.
    Shutdown,
}

pub struct ConnectionWorker {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    directory: Arc<Directory>,
    shutdown: ShutdownSignal,
    options: SessionOptions,
    buffer: LineBuffer,
}

impl ConnectionWorker {
    pub fn new(
        stream: TcpStream,
        directory: Arc<Directory>,
        shutdown: ShutdownSignal,
        options: SessionOptions,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream,
            peer,
            directory,
            shutdown,
            options,
            buffer: LineBuffer::new(),
        }
    }

    /// Serves the connection until it ends. The socket is shut down and
    /// dropped on every path.
    pub async fn run(mut self) -> Result<SessionEnd, ConnectionError> {
        let result = self.serve().await;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<SessionEnd, ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if self.shutdown.is_triggered() {
                return Ok(SessionEnd::Shutdown);
            }

            let wait = timeout(self.options.poll_interval, self.stream.read(&mut chunk));
            let read = match wait.await {
                Ok(read) => read?,
                Err(_elapsed) => continue,
            };

            if read == 0 {
                return self.finish_input().await;
            }

            self.buffer.extend(&chunk[..read]);
            while let Some(command) = self.buffer.next_command(self.options.identifiers) {
                if let Some(end) = self.execute(command).await? {
                    return Ok(end);
                }
            }
        }
    }

    async fn finish_input(&mut self) -> Result<SessionEnd, ConnectionError> {
        match self.options.eof {
            EofPolicy::Close => Err(ConnectionError::Closed),
            EofPolicy::Drain => {
                if let Some(command) = self.buffer.take_remainder(self.options.identifiers) {
                    if let Some(end) = self.execute(command).await? {
                        return Ok(end);
                    }
                }
                Ok(SessionEnd::StopSession)
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<Option<SessionEnd>, ConnectionError> {
        match command.execute(&self.directory) {
            Action::Reply(reply) => self.send_reply(reply.as_bytes()).await,
            Action::Silent => Ok(None),
            Action::EndSession => Ok(Some(SessionEnd::StopSession)),
            Action::Shutdown => {
                if self.shutdown.trigger() {
                    info!(peer = ?self.peer, "shutdown requested by client");
                }
                Ok(Some(SessionEnd::Stop))
            }
        }
    }

    /// Writes a reply in bounded steps. A client that stops reading can fill
    /// the socket buffers, so the signal is checked whenever a step times out.
    async fn send_reply(&mut self, reply: &[u8]) -> Result<Option<SessionEnd>, ConnectionError> {
        let mut written = 0;
        while written < reply.len() {
            let wait = timeout(self.options.poll_interval, self.stream.write(&reply[written..]));
            match wait.await {
                Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(sent) => written += sent?,
                Err(_elapsed) => {
                    if self.shutdown.is_triggered() {
                        debug!(peer = ?self.peer, "abandoning reply the client is not reading");
                        return Ok(Some(SessionEnd::Shutdown));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.shutdown().await {
            debug!(peer = ?self.peer, ?error, "connection was not shut down cleanly");
        }
    }
}
