//! The last pipeline stage and the per-connection context it receives.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::net::connection::ConnectionId;
use crate::pipeline::idle::IdleStateEvent;
use crate::protocol::{CodecError, Transporter};

/// Commands queued from handlers to the connection's write side.
#[derive(Debug)]
pub(crate) enum Outbound {
    Write(Transporter),
    Close,
}

/// Handle to one connection, cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct ChannelContext {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelContext {
    pub(crate) fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self { id, peer, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queue `message` for the encoder. Returns `false` if the connection is gone.
    pub fn write(&self, message: Transporter) -> bool {
        self.outbound.send(Outbound::Write(message)).is_ok()
    }

    /// Close the connection after everything already written is flushed.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Business stage of a connection pipeline.
///
/// Callbacks run on event loop threads and must not block.
pub trait ChannelHandler: Send + Sync + 'static {
    fn channel_active(&self, _ctx: &ChannelContext) {}

    /// A complete inbound message, in arrival order.
    fn channel_read(&self, ctx: &ChannelContext, message: Transporter);

    /// The idle monitor fired.
    fn user_event_triggered(&self, _ctx: &ChannelContext, _event: IdleStateEvent) {}

    /// The decoder failed. The connection closes after this returns.
    fn exception_caught(&self, ctx: &ChannelContext, error: &CodecError) {
        tracing::warn!(connection_id = %ctx.id(), error = %error, "Closing connection after codec error");
    }

    fn channel_inactive(&self, _ctx: &ChannelContext) {}
}
