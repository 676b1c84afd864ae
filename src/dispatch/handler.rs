//! Dispatch handler: the `handler` stage of every server pipeline.
//!
//! Decoded requests are handed to the invocation executor; the invoker's
//! reply is written back through the connection's encoder. Nothing here
//! blocks an event loop thread.

use std::sync::Arc;

use crate::dispatch::executor::InvocationExecutor;
use crate::dispatch::registry::{MethodInvokerRegistry, ServerMethodInvoker};
use crate::observability::metrics;
use crate::pipeline::{ChannelContext, ChannelHandler, IdleStateEvent};
use crate::protocol::{CodecError, Transporter};

pub struct ServerHandler {
    server_name: Arc<str>,
    registry: MethodInvokerRegistry,
    executor: Arc<InvocationExecutor>,
}

impl ServerHandler {
    pub fn new(server_name: &str, executor: Arc<InvocationExecutor>) -> Self {
        Self {
            server_name: Arc::from(server_name),
            registry: MethodInvokerRegistry::new(),
            executor,
        }
    }

    pub fn register_method_invoker(&self, invoker: Arc<dyn ServerMethodInvoker>) {
        self.registry.register(invoker);
    }
}

impl ChannelHandler for ServerHandler {
    fn channel_active(&self, ctx: &ChannelContext) {
        tracing::debug!(
            server = %self.server_name,
            connection_id = %ctx.id(),
            peer_addr = ?ctx.peer_addr(),
            "Channel active"
        );
    }

    fn channel_read(&self, ctx: &ChannelContext, message: Transporter) {
        let task_ctx = ctx.clone();
        let registry = self.registry.clone();
        let server_name = Arc::clone(&self.server_name);
        let request = message.clone();

        let submitted = self.executor.execute(move || {
            let reply = registry.invoke(&request);
            metrics::record_invocation(&server_name, request.method_identifier(), !reply.is_error());
            if !task_ctx.write(reply) {
                tracing::debug!(
                    connection_id = %task_ctx.id(),
                    method = %request.method_identifier(),
                    "Connection closed before reply"
                );
            }
        });

        if let Err(e) = submitted {
            metrics::record_task_rejected(&self.server_name);
            tracing::warn!(
                server = %self.server_name,
                method = %message.method_identifier(),
                error = %e,
                "Request rejected"
            );
            ctx.write(message.reply_error(e.to_string()));
        }
    }

    fn user_event_triggered(&self, ctx: &ChannelContext, event: IdleStateEvent) {
        tracing::info!(
            server = %self.server_name,
            connection_id = %ctx.id(),
            peer_addr = ?ctx.peer_addr(),
            idle_for = ?event.idle_for,
            "Closing idle connection"
        );
        ctx.close();
    }

    fn exception_caught(&self, ctx: &ChannelContext, error: &CodecError) {
        tracing::error!(
            server = %self.server_name,
            connection_id = %ctx.id(),
            error = %error,
            "Closing connection after codec error"
        );
        ctx.close();
    }

    fn channel_inactive(&self, ctx: &ChannelContext) {
        tracing::debug!(server = %self.server_name, connection_id = %ctx.id(), "Channel inactive");
    }
}
