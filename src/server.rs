//! Remoting server: lifecycle controller.
//!
//! # Responsibilities
//! - Pick the I/O backend and build both event loop groups at construction
//! - Bind the listener exactly once on `start`
//! - Forward method invoker registrations to the dispatch handler
//! - Tear everything down exactly once, in order, on `close`
//!
//! `start` and `close` block the calling thread and must not be called from
//! inside an async runtime.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::config::validation::validate_server_config;
use crate::config::ServerConfig;
use crate::dispatch::{InvocationExecutor, ServerHandler, ServerMethodInvoker};
use crate::error::{CloseError, RemotingError, RemotingResult};
use crate::lifecycle::{Lifecycle, LifecycleState, Shutdown};
use crate::net::{Acceptor, BindOptions, ConnectionTracker, ListeningChannel};
use crate::observability::metrics;
use crate::pipeline::PipelineAssembler;
use crate::transport::{EventLoopGroup, EventLoopRole, IoBackend};

/// A TCP server that owns its threads, listener and executor.
///
/// Single use: once closed it cannot be started again.
pub struct RemotingServer {
    config: ServerConfig,
    backend: IoBackend,
    lifecycle: Lifecycle,
    channel: Mutex<Option<ListeningChannel>>,
    boss_group: EventLoopGroup,
    worker_group: EventLoopGroup,
    method_invoker_executor: Arc<InvocationExecutor>,
    handler: Arc<ServerHandler>,
    tracker: ConnectionTracker,
    drain: Shutdown,
}

impl RemotingServer {
    pub fn new(config: ServerConfig) -> RemotingResult<Self> {
        let server_name = config.server_name.clone();
        validate_server_config(&config).map_err(|errors| RemotingError::InvalidConfig {
            server_name: server_name.clone(),
            errors,
        })?;
        let backend = IoBackend::select(config.epoll_enabled);

        let method_invoker_executor = InvocationExecutor::new(
            &format!("{}-methodInvoker", server_name),
            InvocationExecutor::default_threads(),
        )
        .map_err(|source| RemotingError::Executor {
            server_name: server_name.clone(),
            source,
        })?;
        let method_invoker_executor = Arc::new(method_invoker_executor);
        let handler = Arc::new(ServerHandler::new(
            &server_name,
            Arc::clone(&method_invoker_executor),
        ));

        let boss_group = EventLoopGroup::new(&server_name, EventLoopRole::Boss, 1, backend)
            .map_err(|source| RemotingError::EventLoop {
                server_name: server_name.clone(),
                role: EventLoopRole::Boss.as_str(),
                source,
            })?;
        let worker_group = EventLoopGroup::new(
            &server_name,
            EventLoopRole::Worker,
            config.worker_threads,
            backend,
        )
        .map_err(|source| RemotingError::EventLoop {
            server_name: server_name.clone(),
            role: EventLoopRole::Worker.as_str(),
            source,
        })?;

        tracing::debug!(
            server = %server_name,
            backend = %backend,
            worker_threads = worker_group.threads(),
            invoker_threads = method_invoker_executor.threads(),
            "Server created"
        );

        Ok(Self {
            config,
            backend,
            lifecycle: Lifecycle::new(),
            channel: Mutex::new(None),
            boss_group,
            worker_group,
            method_invoker_executor,
            handler,
            tracker: ConnectionTracker::new(),
            drain: Shutdown::new(),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn backend(&self) -> IoBackend {
        self.backend
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    pub fn method_invoker_executor(&self) -> &Arc<InvocationExecutor> {
        &self.method_invoker_executor
    }

    /// Address the listener is bound to, while it is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_channel().as_ref().map(ListeningChannel::local_addr)
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Bind the configured port and start accepting.
    ///
    /// Only the first call does anything; later calls return `Ok(())`. On
    /// failure the server stays `Running` without a listener and `close`
    /// must still be called.
    pub fn start(&self) -> RemotingResult<()> {
        if !self.lifecycle.try_start() {
            return Ok(());
        }

        let server_name = self.server_name().to_string();
        let port = self.config.listen_port;
        let assembler = PipelineAssembler::new(&self.config, self.handler.clone());
        let acceptor = Acceptor::new(
            &self.config,
            self.worker_group.handle().clone(),
            assembler,
            self.tracker.clone(),
            self.drain.clone(),
        );
        let options = BindOptions {
            backend: self.backend,
            port,
            backlog: self.config.so_backlog,
        };

        let (bound_tx, bound_rx) = oneshot::channel();
        self.boss_group.spawn(acceptor.bind_and_serve(options, bound_tx));

        match bound_rx.blocking_recv() {
            Ok(Ok(channel)) => {
                // Held across the check and the store; close() unbinds under it.
                let mut slot = self.lock_channel();
                if self.state() == LifecycleState::Closed {
                    // Dropping the channel stops the acceptor.
                    return Err(RemotingError::InterruptedDuringStart { server_name, port });
                }
                tracing::info!(
                    server = %server_name,
                    port,
                    local_addr = %channel.local_addr(),
                    backend = %self.backend,
                    "{} bind success at port: {}",
                    server_name,
                    port
                );
                *slot = Some(channel);
                Ok(())
            }
            Ok(Err(source)) => {
                tracing::error!(server = %server_name, port, error = %source, "{} bind {} fail", server_name, port);
                Err(RemotingError::Bind {
                    server_name,
                    port,
                    source,
                })
            }
            Err(_) => Err(RemotingError::InterruptedDuringStart { server_name, port }),
        }
    }

    /// Forward an invoker registration to the dispatch handler.
    pub fn register_method_invoker(&self, invoker: Arc<dyn ServerMethodInvoker>) {
        self.handler.register_method_invoker(invoker);
    }

    /// Release everything the server owns. Never fails; only the first call
    /// after a successful `start` transition does anything.
    pub fn close(&self) {
        if !self.lifecycle.try_close() {
            return;
        }
        let server_name = self.server_name().to_string();
        let grace = self.config.shutdown_grace();
        tracing::info!(server = %server_name, "{} closing", server_name);

        self.close_step("unbind", || {
            let channel = self.lock_channel().take();
            if let Some(channel) = channel {
                channel.close_sync()?;
                tracing::info!(
                    server = %server_name,
                    port = self.config.listen_port,
                    "{} stop bind at port: {}",
                    server_name,
                    self.config.listen_port
                );
            }
            Ok(())
        });

        self.close_step("boss group shutdown", || {
            self.boss_group.shutdown_gracefully(grace);
            Ok(())
        });

        self.close_step("worker group shutdown", || {
            self.drain.trigger();
            if !self.tracker.wait_for_drain(grace) {
                tracing::warn!(
                    server = %server_name,
                    remaining = self.tracker.active_count(),
                    "Connections still open after grace period"
                );
            }
            self.worker_group.shutdown_gracefully(grace);
            Ok(())
        });

        self.close_step("method invoker executor shutdown", || {
            let abandoned = self.method_invoker_executor.shutdown_now();
            if abandoned > 0 {
                metrics::record_tasks_abandoned(&server_name, abandoned);
                tracing::warn!(server = %server_name, abandoned, "Abandoned queued invocations");
            }
            Ok(())
        });

        tracing::info!(server = %server_name, "{} closed", server_name);
    }

    /// Run one teardown step. Failures are logged and never stop later steps.
    fn close_step<F>(&self, step: &'static str, f: F)
    where
        F: FnOnce() -> Result<(), CloseError>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(CloseError::Interrupted(what))) => {
                tracing::warn!(
                    server = %self.server_name(),
                    step,
                    "Interrupted while waiting for {}, continuing shutdown",
                    what
                );
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    server = %self.server_name(),
                    step,
                    error = %reason,
                    "{} close failed",
                    self.server_name()
                );
            }
        }
    }

    fn lock_channel(&self) -> std::sync::MutexGuard<'_, Option<ListeningChannel>> {
        self.channel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RemotingServer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RemotingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotingServer")
            .field("server_name", &self.config.server_name)
            .field("state", &self.state())
            .field("backend", &self.backend)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
