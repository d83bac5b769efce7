//! Answering server.
//!
//! Accepts TCP connections and runs one answering session per connection on
//! its own task. The number of concurrent sessions is bounded; callers above
//! the limit get `BSY` and are disconnected.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};

use crate::config::BinkConfig;
use crate::core::{BinkpResult, COMMAND_SEND_TIMEOUT, InboundSink};
use crate::frame::{CommandId, Frame, write_frame};
use crate::session::{RemoteNode, Session, SessionConfig, SessionReport, normalize_password};
use crate::transfer::{DirectorySink, OutboundQueue};
use crate::transport::Transport;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listener.
    #[error("bind to {addr} failed: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        source: io::Error,
    },

    /// I/O error on the listener.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", crate::core::DEFAULT_PORT),
            max_sessions: 8,
        }
    }
}

impl From<&BinkConfig> for ServerConfig {
    fn from(config: &BinkConfig) -> Self {
        Self {
            bind_addr: format!("{}:{}", config.binkp.bind, config.binkp.port),
            max_sessions: config.binkp.max_sessions,
        }
    }
}

/// Builder for a [`ServerConfig`].
#[derive(Debug)]
pub struct BinkServerBuilder {
    config: ServerConfig,
}

impl BinkServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the bind address (`host:port`).
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max.max(1);
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for BinkServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Supplies what each inbound session works with, and takes it back.
pub trait SessionFactory: Send + Sync + 'static {
    /// Sink type handed to each session.
    type Sink: InboundSink + 'static;

    /// Configuration, outbound queue and sink for a new connection.
    fn open(&self, peer: SocketAddr) -> io::Result<(SessionConfig, OutboundQueue, Self::Sink)>;

    /// Items to send once the caller on `peer` has authenticated.
    ///
    /// Runs once per session, after the remote `ADR` (and `PWD`, if any) was
    /// accepted. The items are queued behind those from [`SessionFactory::open`].
    fn outbound_for(&self, peer: SocketAddr, remote: &RemoteNode, secure: bool) -> io::Result<OutboundQueue> {
        let _ = (peer, remote, secure);
        Ok(OutboundQueue::new())
    }

    /// Called once the session is over.
    fn finished(
        &self,
        peer: SocketAddr,
        result: &BinkpResult<SessionReport>,
        queue: OutboundQueue,
        sink: Self::Sink,
    ) {
        let _ = (peer, result, queue, sink);
    }
}

/// Factory answering with the settings of a [`BinkConfig`].
///
/// Received files go to the inbound directory. A caller with a callout entry
/// is handed whatever waits in its outbound spool; a password protected node
/// only gets it on a secure session.
#[derive(Debug, Clone)]
pub struct ConfigSessionFactory {
    config: Arc<BinkConfig>,
}

impl ConfigSessionFactory {
    /// Create a factory from a loaded configuration.
    pub fn new(config: BinkConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl SessionFactory for ConfigSessionFactory {
    type Sink = DirectorySink;

    fn open(&self, _peer: SocketAddr) -> io::Result<(SessionConfig, OutboundQueue, DirectorySink)> {
        let sink = DirectorySink::new(&self.config.binkp.inbound_dir)?;
        Ok((self.config.answering_session(), OutboundQueue::new(), sink))
    }

    fn outbound_for(&self, peer: SocketAddr, remote: &RemoteNode, secure: bool) -> io::Result<OutboundQueue> {
        let mut queue = OutboundQueue::new();
        for address in &remote.addresses {
            let Some(callout) = self.config.callout(address) else {
                continue;
            };
            let protected = callout.password.as_deref().and_then(normalize_password).is_some();
            if protected && !secure {
                warn!("{}: {} is password protected, holding its mail", peer, callout.address);
                continue;
            }
            let spool = self.config.outbound_spool(&callout.address);
            if !spool.is_dir() {
                continue;
            }
            for item in OutboundQueue::from_spool(&spool)?.into_remaining() {
                if let Err(e) = queue.push(item) {
                    debug!("{}: {}", peer, e);
                }
            }
        }
        if !queue.is_empty() {
            info!("{}: {} files waiting for {}", peer, queue.len(), remote.primary_address());
        }
        Ok(queue)
    }

    fn finished(
        &self,
        peer: SocketAddr,
        result: &BinkpResult<SessionReport>,
        _queue: OutboundQueue,
        sink: DirectorySink,
    ) {
        match result {
            Ok(report) => info!("{}: {}", peer, report.summary()),
            Err(e) => warn!("{}: session failed: {}", peer, e),
        }
        debug!("{}: {} files written", peer, sink.delivered().len());
    }
}

/// Handle for stopping a running [`BinkServer`].
#[derive(Debug, Clone)]
pub struct ServerShutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl ServerShutdown {
    /// Stop accepting connections. Running sessions finish on their own.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// A binkp answering server.
///
/// # Example
///
/// ```ignore
/// let config = BinkConfig::load("binkp.toml").await?;
/// let server = BinkServer::bind(ServerConfig::from(&config), ConfigSessionFactory::new(config)).await?;
/// server.serve().await?;
/// ```
pub struct BinkServer<F: SessionFactory> {
    listener: TcpListener,
    factory: Arc<F>,
    permits: Arc<Semaphore>,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<F: SessionFactory> BinkServer<F> {
    /// Bind the listener.
    pub async fn bind(config: ServerConfig, factory: F) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            factory: Arc::new(factory),
            permits: Arc::new(Semaphore::new(config.max_sessions.max(1))),
            config,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.config.max_sessions.max(1) - self.permits.available_permits()
    }

    /// Get a handle that stops [`BinkServer::serve`].
    pub fn shutdown_handle(&self) -> ServerShutdown {
        ServerShutdown {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until shut down.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown_rx.wait_for(|stop| *stop) => {
                    info!("server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("accept failed: {}", e);
                        continue;
                    }
                },
            };

            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => {
                    let factory = Arc::clone(&self.factory);
                    tokio::spawn(async move {
                        answer(factory, stream, peer).await;
                        drop(permit);
                    });
                }
                Err(_) => {
                    warn!("{}: too many sessions, answering busy", peer);
                    tokio::spawn(refuse_busy(stream));
                }
            }
        }
    }
}

async fn answer<F: SessionFactory>(factory: Arc<F>, stream: TcpStream, peer: SocketAddr) {
    info!("incoming connection from {}", peer);
    let (config, queue, sink) = match factory.open(peer) {
        Ok(parts) => parts,
        Err(e) => {
            error!("{}: cannot prepare session: {}", peer, e);
            return;
        }
    };
    let mut session = Session::new(Transport::from_tcp(stream), config, queue, sink);
    let hook = Arc::clone(&factory);
    session.refill_after_auth(move |remote, secure| hook.outbound_for(peer, remote, secure));
    let result = session.run().await;
    let (queue, sink) = session.into_parts();
    factory.finished(peer, &result, queue, sink);
}

async fn refuse_busy(stream: TcpStream) {
    let mut transport = Transport::from_tcp(stream);
    let frame = Frame::command(CommandId::Bsy, "too many sessions, try again later");
    if let Err(e) = write_frame(&mut transport, &frame, COMMAND_SEND_TIMEOUT).await {
        debug!("{}: could not send M_BSY: {}", transport.peer(), e);
    }
    transport.close().await;
}
