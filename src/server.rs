//! TCP listener loop: accept connections, spawn one session task each.
//!
//! Every session shares the same [`TableStore`] and [`Metrics`] by `Arc`;
//! there is no per-connection replica of anything but the read buffer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::session::Session;
use crate::store::TableStore;

pub const DEFAULT_MAX_LINE_BYTES: usize = 8192;

pub struct Server {
    listener: TcpListener,
    store: Arc<TableStore>,
    metrics: Arc<Metrics>,
    max_line_bytes: usize,
}

impl Server {
    pub fn new(listener: TcpListener, max_line_bytes: usize) -> Self {
        Self {
            listener,
            store: Arc::new(TableStore::new()),
            metrics: Arc::new(Metrics::new()),
            max_line_bytes,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared tables, for tests and embedding.
    pub fn store(&self) -> Arc<TableStore> {
        Arc::clone(&self.store)
    }

    /// The shared counter sink, for reporters and tests.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Accepts connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            store,
            metrics,
            max_line_bytes,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            spawn_session(stream, peer, &store, &metrics, max_line_bytes);
                        }
                        Err(err) => warn!(error = ?err, "failed to accept connection"),
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    store: &Arc<TableStore>,
    metrics: &Arc<Metrics>,
    max_line_bytes: usize,
) {
    let store = Arc::clone(store);
    let metrics = Arc::clone(metrics);
    tokio::spawn(async move {
        info!(peer = %peer, "session started");
        let (reader, writer) = stream.into_split();
        let session = Session::new(store, metrics, max_line_bytes);
        match session.run(reader, writer).await {
            Ok(()) => info!(peer = %peer, "session ended"),
            Err(err) => warn!(peer = %peer, error = ?err, "session closed with error"),
        }
    });
}
