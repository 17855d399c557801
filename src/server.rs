//! Listener lifecycle: bind, serve in the background, shut down.
//!
//! A [`Server`] owns a bound listener. [`Server::spawn`] moves it into a
//! background task that accepts connections and serves each one on a task
//! kept in a [`JoinSet`]. The serve task owns that set, so cancelling it
//! cancels every connection with it. After [`RunningServer::shutdown`]
//! returns, or once the handle is dropped, no request on any connection is
//! answered and the port is free again.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, error, info, warn};

use crate::api::{create_router, AppState};
use crate::error::{Result, ServerError};
use crate::metrics;
use crate::utils::connect_host;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A bound, not yet serving, HTTP listener.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind a listener. Port 0 selects an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        metrics::inc_listener_binds();
        info!("HTTP server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start serving the API on a background task.
    pub fn spawn(self, state: AppState) -> RunningServer {
        let router = create_router(state.clone());
        let graceful = CancellationToken::new();
        let force = CancellationToken::new();
        let addr = self.local_addr;

        let handle = tokio::spawn(accept_loop(
            self.listener,
            router,
            graceful.clone(),
            force.clone(),
        ));

        state.set_ready(true);

        RunningServer {
            addr,
            state,
            graceful,
            force,
            handle: Some(handle),
        }
    }
}

/// Accept until `graceful` fires, then drain connections until they finish
/// or `force` fires.
async fn accept_loop(
    listener: TcpListener,
    router: Router,
    graceful: CancellationToken,
    force: CancellationToken,
) -> std::io::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = graceful.cancelled() => break,
            _ = force.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    connections.spawn(serve_connection(stream, peer, router.clone(), graceful.clone()));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_exit(joined);
            }
        }
    }

    // Stop accepting before waiting on open connections.
    drop(listener);
    debug!("Listener closed, {} connection(s) open", connections.len());

    loop {
        tokio::select! {
            biased;
            _ = force.cancelled() => {
                debug!("Aborting {} open connection(s)", connections.len());
                connections.shutdown().await;
                break;
            }
            joined = connections.join_next() => match joined {
                Some(joined) => log_connection_exit(joined),
                None => break,
            },
        }
    }

    Ok(())
}

/// Serve HTTP/1 on one connection, shutting it down gracefully on `graceful`.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    graceful: CancellationToken,
) {
    let service = hyper::service::service_fn(move |req: hyper::Request<Incoming>| {
        router.clone().call(req)
    });

    let mut conn = pin!(http1::Builder::new().serve_connection(TokioIo::new(stream), service));

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = graceful.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!("Connection from {} ended with error: {}", peer, e);
    }
}

fn log_connection_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Connection task panicked: {}", e);
        }
    }
}

/// Handle to a serving listener.
#[derive(Debug)]
pub struct RunningServer {
    addr: SocketAddr,
    state: AppState,
    graceful: CancellationToken,
    force: CancellationToken,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients can connect to, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", connect_host(self.addr), self.addr.port())
    }

    /// Full URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }

    /// Shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Whether the serve task has already exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop accepting connections and wait for open ones to finish.
    ///
    /// In-flight requests are allowed to finish within `timeout`. After that
    /// every remaining connection is aborted and `ShutdownTimeout` is
    /// returned. Either way the listener and all connections are closed when
    /// this returns.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        self.state.set_ready(false);
        self.graceful.cancel();

        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => {
                metrics::inc_listener_shutdowns();
                joined??;
                info!("HTTP server on {} stopped", self.addr);
                Ok(())
            }
            Err(_) => {
                warn!(
                    "HTTP server on {} did not stop within {:?}, aborting connections",
                    self.addr, timeout
                );
                self.force.cancel();
                let joined = handle.await;
                metrics::inc_listener_shutdowns();
                joined??;
                Err(ServerError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Serve until `signal` resolves, then shut down within `timeout`.
    pub async fn run_until<F>(self, signal: F, timeout: Duration) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown(timeout).await
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.graceful.cancel();
        self.force.cancel();
        if let Some(handle) = self.handle.take() {
            debug!("RunningServer for {} dropped, aborting serve task", self.addr);
            self.state.set_ready(false);
            // Dropping the serve future drops its JoinSet, which aborts
            // every connection task.
            handle.abort();
            metrics::inc_listener_shutdowns();
        }
    }
}

/// Bind `addr`, serve the API until Ctrl-C/SIGTERM, then shut down.
pub async fn serve_until_signal(
    addr: SocketAddr,
    state: AppState,
    shutdown_timeout: Duration,
) -> Result<()> {
    let server = Server::bind(addr).await?;
    let running = server.spawn(state);

    running
        .run_until(crate::utils::shutdown_signal(), shutdown_timeout)
        .await
}
