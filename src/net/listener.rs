//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind the listening socket with the configured options
//! - Accept connections on the boss group
//! - Apply per-connection socket options
//! - Hand each connection to the worker group with its assembled pipeline

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::error::CloseError;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;
use crate::pipeline::PipelineAssembler;
use crate::transport::IoBackend;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Options for the listening socket.
#[derive(Debug, Clone, Copy)]
pub struct BindOptions {
    pub backend: IoBackend,
    pub port: u16,
    pub backlog: i32,
}

/// Options applied to every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ChildOptions {
    pub keepalive: bool,
    pub nodelay: bool,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
}

impl ChildOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            keepalive: config.so_keepalive,
            nodelay: config.tcp_no_delay,
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.receive_buffer_size,
        }
    }

    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let socket = SockRef::from(stream);
        socket.set_keepalive(self.keepalive)?;
        socket.set_nodelay(self.nodelay)?;
        socket.set_send_buffer_size(self.send_buffer_size)?;
        socket.set_recv_buffer_size(self.recv_buffer_size)?;
        Ok(())
    }
}

/// Bind a listening socket on all interfaces. SO_REUSEADDR is always set.
///
/// Must be called inside the runtime that will drive the listener.
pub fn bind_listener(options: &BindOptions) -> io::Result<TcpListener> {
    options.backend.ensure_available()?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, options.port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(options.backlog)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}

/// Handle to a bound, accepting listener.
#[derive(Debug)]
pub struct ListeningChannel {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    closed: oneshot::Receiver<()>,
}

impl ListeningChannel {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and block until the socket is released.
    ///
    /// Must not be called from inside an async context.
    pub fn close_sync(self) -> Result<(), CloseError> {
        let _ = self.stop.send(());
        self.closed
            .blocking_recv()
            .map_err(|_| CloseError::Interrupted("listening channel close"))
    }
}

/// Accept loop for one server.
pub struct Acceptor {
    server_name: Arc<str>,
    child_options: ChildOptions,
    worker: Handle,
    assembler: PipelineAssembler,
    tracker: ConnectionTracker,
    drain: Shutdown,
}

impl Acceptor {
    pub fn new(
        config: &ServerConfig,
        worker: Handle,
        assembler: PipelineAssembler,
        tracker: ConnectionTracker,
        drain: Shutdown,
    ) -> Self {
        Self {
            server_name: Arc::from(config.server_name.as_str()),
            child_options: ChildOptions::from_config(config),
            worker,
            assembler,
            tracker,
            drain,
        }
    }

    /// Bind, report the outcome through `bound`, then accept until stopped.
    pub async fn bind_and_serve(
        self,
        options: BindOptions,
        bound: oneshot::Sender<io::Result<ListeningChannel>>,
    ) {
        let listener = match bind_listener(&options) {
            Ok(listener) => listener,
            Err(e) => {
                let _ = bound.send(Err(e));
                return;
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let _ = bound.send(Err(e));
                return;
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let channel = ListeningChannel {
            local_addr,
            stop: stop_tx,
            closed: closed_rx,
        };
        if bound.send(Ok(channel)).is_err() {
            // Nobody is waiting for this listener.
            return;
        }

        self.serve(listener, stop_rx).await;
        let _ = closed_tx.send(());
    }

    async fn serve(self, listener: TcpListener, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stop => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        tracing::warn!(server = %self.server_name, error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
        drop(listener);
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = self.child_options.apply(&stream) {
            tracing::warn!(peer_addr = %peer, error = %e, "Failed to apply child socket options");
        }

        // Re-register with the worker group's reactor.
        let std_stream = match stream.into_std() {
            Ok(std_stream) => std_stream,
            Err(e) => {
                tracing::warn!(peer_addr = %peer, error = %e, "Failed to detach accepted connection");
                return;
            }
        };

        let guard = self.tracker.track();
        metrics::record_connection_accepted(&self.server_name);
        metrics::record_active_connections(&self.server_name, self.tracker.active_count());
        tracing::debug!(
            server = %self.server_name,
            connection_id = %guard.id(),
            peer_addr = %peer,
            "Connection accepted"
        );

        let assembler = self.assembler.clone();
        let drain = self.drain.subscribe();
        let tracker = self.tracker.clone();
        let server_name = Arc::clone(&self.server_name);

        self.worker.spawn(async move {
            match TcpStream::from_std(std_stream) {
                Ok(stream) => {
                    let pipeline = assembler.assemble(stream, guard.id());
                    pipeline.run(drain).await;
                }
                Err(e) => {
                    tracing::warn!(peer_addr = %peer, error = %e, "Failed to register connection");
                }
            }
            drop(guard);
            metrics::record_active_connections(&server_name, tracker.active_count());
        });
    }
}
