use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    task::{JoinError, JoinSet},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    config::SessionOptions,
    directory::Directory,
    shutdown::ShutdownSignal,
    worker::{ConnectionError, ConnectionWorker, SessionEnd},
};

type WorkerResult = Result<SessionEnd, ConnectionError>;

/// Accepts TCP clients and runs one worker task per connection.
pub struct Listener {
    listener: TcpListener,
    directory: Arc<Directory>,
    shutdown: ShutdownSignal,
    options: SessionOptions,
}

impl Listener {
    pub fn new(listener: TcpListener, directory: Arc<Directory>, options: SessionOptions) -> Self {
        Self {
            listener,
            directory,
            shutdown: ShutdownSignal::new(),
            options,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the signal every worker of this listener polls.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Accepts connections until the shutdown signal is raised, then waits for
    /// every worker to finish.
    ///
    /// A failing `accept` is fatal: workers are told to stop and joined before
    /// the error is returned.
    pub async fn run(self) -> Result<()> {
        let Listener {
            listener,
            directory,
            shutdown,
            options,
        } = self;
        let mut workers = JoinSet::new();

        let outcome =
            accept_until_shutdown(&listener, &directory, &shutdown, options, &mut workers).await;
        if outcome.is_err() {
            shutdown.trigger();
        }

        drop(listener);
        info!(active = workers.len(), "listener closed, waiting for workers");
        while let Some(result) = workers.join_next().await {
            log_worker_exit(result);
        }
        info!("all workers finished");

        outcome
    }

    /// Like [`Listener::run`], but `external` completing also raises the
    /// shutdown signal.
    pub async fn run_until<F>(self, external: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown_signal();
        let watcher = tokio::spawn(async move {
            external.await;
            if shutdown.trigger() {
                info!("shutdown requested by operator");
            }
        });

        let result = self.run().await;
        watcher.abort();
        result
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
}

async fn accept_until_shutdown(
    listener: &TcpListener,
    directory: &Arc<Directory>,
    shutdown: &ShutdownSignal,
    options: SessionOptions,
    workers: &mut JoinSet<WorkerResult>,
) -> Result<()> {
    while !shutdown.is_triggered() {
        if let Ok(accepted) = timeout(options.poll_interval, listener.accept()).await {
            let (stream, peer) = accepted.context("failed to accept connection")?;
            spawn_worker(stream, peer, directory, shutdown, options, workers);
        }

        while let Some(result) = workers.try_join_next() {
            log_worker_exit(result);
        }
    }

    Ok(())
}

fn spawn_worker(
    stream: TcpStream,
    peer: SocketAddr,
    directory: &Arc<Directory>,
    shutdown: &ShutdownSignal,
    options: SessionOptions,
    workers: &mut JoinSet<WorkerResult>,
) {
    debug!(peer = %peer, "client connected");
    let worker = ConnectionWorker::new(stream, Arc::clone(directory), shutdown.clone(), options);
    workers.spawn(worker.run());
}

fn log_worker_exit(result: Result<WorkerResult, JoinError>) {
    match result {
        Ok(Ok(end)) => debug!(?end, "session ended"),
        Ok(Err(ConnectionError::Closed)) => debug!("client closed the connection"),
        Ok(Err(err)) => warn!(error = ?err, "client connection closed with error"),
        Err(err) => warn!(error = ?err, "worker task failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn run_returns_once_signal_is_raised() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let options = SessionOptions::default().with_poll_interval(Duration::from_millis(20));
        let listener = Listener::new(listener, Arc::new(Directory::default()), options);
        let shutdown = listener.shutdown_signal();

        let server = tokio::spawn(listener.run());
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("listener should stop within a few polls")
            .expect("listener task panicked")
            .expect("listener should exit cleanly");
    }

    #[tokio::test]
    async fn external_future_stops_the_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let options = SessionOptions::default().with_poll_interval(Duration::from_millis(20));
        let listener = Listener::new(listener, Arc::new(Directory::default()), options);
        let shutdown = listener.shutdown_signal();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(listener.run_until(async move {
            let _ = stop_rx.await;
        }));
        let _ = stop_tx.send(());

        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("listener should stop")
            .expect("listener task panicked")
            .expect("listener should exit cleanly");
        assert!(shutdown.is_triggered());
    }
}
