use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpStream, UdpSocket},
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    cli::{TcpClientArgs, UdpClientArgs},
    protocol::INVALID_INPUT,
};

const MAX_REPLY: usize = 4096;

/// What one line of user input turns into on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(String),
    Stop,
    EndSession,
}

impl Request {
    /// `None` means stdin is exhausted.
    pub fn from_input(input: Option<&str>) -> Self {
        match input.map(|line| line.trim_end_matches(['\r', '\n'])) {
            None => Request::EndSession,
            Some("STOP") => Request::Stop,
            Some(line) => Request::Get(line.to_string()),
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Request::Get(query) => format!("GET {query}\n"),
            Request::Stop => "STOP\n".to_string(),
            Request::EndSession => "STOP_SESSION\n".to_string(),
        }
    }
}

/// Splits a server reply into a name for stdout or a message for stderr.
pub fn interpret_reply(reply: &str, query: &str) -> std::result::Result<String, String> {
    if !reply.starts_with("ERROR") {
        return Ok(reply.to_string());
    }
    if reply == INVALID_INPUT {
        Err("error: invalid input".to_string())
    } else {
        Err(format!("error: {query}"))
    }
}

pub async fn run_tcp(args: TcpClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (mut reader, mut writer) = stream.into_split();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut buf = [0u8; MAX_REPLY];

    loop {
        let request = read_request(&mut stdin).await?;
        writer.write_all(request.to_wire().as_bytes()).await?;

        let Request::Get(query) = request else {
            break;
        };

        let len = reader.read(&mut buf).await?;
        if len == 0 {
            write_stderr("*** server closed the connection").await?;
            break;
        }
        render_reply(&String::from_utf8_lossy(&buf[..len]), &query).await?;
    }

    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
    Ok(())
}

pub async fn run_udp(args: UdpClientArgs) -> Result<()> {
    let socket = UdpSocket::bind(unspecified_for(args.server))
        .await
        .context("failed to bind client socket")?;
    socket
        .connect(args.server)
        .await
        .with_context(|| format!("failed to reach {}", args.server))?;
    info!("sending to {}", args.server);

    let reply_timeout = Duration::from_millis(args.reply_timeout_ms);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut buf = [0u8; MAX_REPLY];

    loop {
        let request = read_request(&mut stdin).await?;
        socket.send(request.to_wire().as_bytes()).await?;

        let Request::Get(query) = request else {
            break;
        };

        match timeout(reply_timeout, socket.recv(&mut buf)).await {
            Ok(received) => {
                let len = received.context("failed to receive reply")?;
                render_reply(&String::from_utf8_lossy(&buf[..len]), &query).await?;
            }
            Err(_) => write_stderr(&format!("error: no reply for {query}")).await?,
        }
    }

    Ok(())
}

async fn read_request(stdin: &mut BufReader<tokio::io::Stdin>) -> io::Result<Request> {
    let mut input = String::new();
    let bytes_read = stdin.read_line(&mut input).await?;
    let input = (bytes_read > 0).then_some(input.as_str());
    Ok(Request::from_input(input))
}

fn unspecified_for(server: SocketAddr) -> SocketAddr {
    match server {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

async fn render_reply(reply: &str, query: &str) -> io::Result<()> {
    match interpret_reply(reply, query) {
        Ok(name) => write_stdout(&name).await,
        Err(message) => write_stderr(&message).await,
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_lines_become_requests() {
        assert_eq!(
            Request::from_input(Some("1 2\n")),
            Request::Get("1 2".into())
        );
        assert_eq!(Request::from_input(Some("STOP\n")), Request::Stop);
        assert_eq!(
            Request::from_input(Some("stop\n")),
            Request::Get("stop".into())
        );
        assert_eq!(Request::from_input(None), Request::EndSession);
    }

    #[test]
    fn requests_are_newline_terminated() {
        assert_eq!(Request::Get("1 2".into()).to_wire(), "GET 1 2\n");
        assert_eq!(Request::Stop.to_wire(), "STOP\n");
        assert_eq!(Request::EndSession.to_wire(), "STOP_SESSION\n");
    }

    #[test]
    fn replies_are_split_by_error_prefix() {
        assert_eq!(interpret_reply("Ada", "1 2"), Ok("Ada".to_string()));
        assert_eq!(
            interpret_reply("ERROR_1_9", "1 9"),
            Err("error: 1 9".to_string())
        );
        assert_eq!(
            interpret_reply(INVALID_INPUT, "x"),
            Err("error: invalid input".to_string())
        );
    }
}
