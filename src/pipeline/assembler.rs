//! Per-connection pipeline assembly.
//!
//! Every accepted connection gets the same stages, in this order:
//!
//! ```text
//! encoder → decoder → server-idle-handle → handler
//! ```
//!
//! The idle monitor sits between framing and the handler, so idle events
//! reach the handler between whole messages and never split a frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::ServerConfig;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::pipeline::handler::{ChannelContext, ChannelHandler, Outbound};
use crate::pipeline::idle::{IdleStateMonitor, InboundEvent};
use crate::protocol::{TransporterDecoder, TransporterEncoder};

/// Stage names, in installation order.
pub const PIPELINE_STAGES: [&str; 4] = ["encoder", "decoder", "server-idle-handle", "handler"];

/// Builds identical pipelines for every connection of one server.
#[derive(Clone)]
pub struct PipelineAssembler {
    server_name: Arc<str>,
    reader_idle: Duration,
    max_frame_length: usize,
    handler: Arc<dyn ChannelHandler>,
}

impl PipelineAssembler {
    pub fn new(config: &ServerConfig, handler: Arc<dyn ChannelHandler>) -> Self {
        Self {
            server_name: Arc::from(config.server_name.as_str()),
            reader_idle: config.connection_idle_time(),
            max_frame_length: config.max_frame_length,
            handler,
        }
    }

    pub fn stages(&self) -> &'static [&'static str] {
        &PIPELINE_STAGES
    }

    /// Assemble the pipeline for an accepted TCP connection.
    pub fn assemble(
        &self,
        stream: TcpStream,
        id: ConnectionId,
    ) -> ChannelPipeline<OwnedReadHalf, OwnedWriteHalf> {
        let peer = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        self.assemble_io(read, write, id, peer)
    }

    /// Assemble a pipeline over arbitrary byte halves.
    ///
    /// Must be called inside a runtime with the time driver enabled.
    pub fn assemble_io<R, W>(
        &self,
        read: R,
        write: W,
        id: ConnectionId,
        peer: Option<SocketAddr>,
    ) -> ChannelPipeline<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let encoder = FramedWrite::new(write, TransporterEncoder);
        let decoder = FramedRead::new(read, TransporterDecoder::new(self.max_frame_length));
        let idle = IdleStateMonitor::new(decoder, self.reader_idle);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        ChannelPipeline {
            server_name: Arc::clone(&self.server_name),
            encoder,
            inbound: idle,
            handler: Arc::clone(&self.handler),
            ctx: ChannelContext::new(id, peer, outbound_tx),
            outbound_rx,
        }
    }
}

impl std::fmt::Debug for PipelineAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineAssembler")
            .field("server_name", &self.server_name)
            .field("stages", &PIPELINE_STAGES)
            .field("reader_idle", &self.reader_idle)
            .finish()
    }
}

/// The assembled stages of one connection.
pub struct ChannelPipeline<R, W> {
    server_name: Arc<str>,
    encoder: FramedWrite<W, TransporterEncoder>,
    inbound: IdleStateMonitor<FramedRead<R, TransporterDecoder>>,
    handler: Arc<dyn ChannelHandler>,
    ctx: ChannelContext,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl<R, W> ChannelPipeline<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Drive the connection until EOF, a codec error, an explicit close, or
    /// `drain` fires. On drain, already queued writes are flushed first.
    pub async fn run(mut self, mut drain: broadcast::Receiver<()>) {
        let ctx = self.ctx.clone();
        self.handler.channel_active(&ctx);

        let mut draining = false;
        loop {
            tokio::select! {
                biased;

                _ = drain.recv() => {
                    draining = true;
                    break;
                }

                outbound = self.outbound_rx.recv() => match outbound {
                    Some(Outbound::Write(message)) => {
                        if let Err(e) = self.encoder.send(message).await {
                            tracing::debug!(connection_id = %ctx.id(), error = %e, "Write failed");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                },

                inbound = self.inbound.next() => match inbound {
                    Some(InboundEvent::Message(Ok(message))) => {
                        metrics::record_frame_decoded(&self.server_name);
                        self.handler.channel_read(&ctx, message);
                    }
                    Some(InboundEvent::Message(Err(e))) => {
                        self.handler.exception_caught(&ctx, &e);
                        break;
                    }
                    Some(InboundEvent::Idle(event)) => {
                        metrics::record_idle_event(&self.server_name);
                        self.handler.user_event_triggered(&ctx, event);
                    }
                    None => break,
                },
            }
        }

        if draining {
            while let Ok(Outbound::Write(message)) = self.outbound_rx.try_recv() {
                if self.encoder.feed(message).await.is_err() {
                    break;
                }
            }
        }
        let _ = self.encoder.close().await;

        self.handler.channel_inactive(&ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::idle::IdleStateEvent;
    use crate::protocol::Transporter;
    use crate::lifecycle::Shutdown;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio_util::codec::Encoder;

    /// Replies inline and counts idle events.
    #[derive(Default)]
    struct EchoHandler {
        idle_events: AtomicUsize,
        inactive: AtomicUsize,
    }

    impl ChannelHandler for EchoHandler {
        fn channel_read(&self, ctx: &ChannelContext, message: Transporter) {
            ctx.write(message.reply(message.body.clone()));
        }

        fn user_event_triggered(&self, _ctx: &ChannelContext, _event: IdleStateEvent) {
            self.idle_events.fetch_add(1, Ordering::SeqCst);
        }

        fn channel_inactive(&self, _ctx: &ChannelContext) {
            self.inactive.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Client {
        reader: FramedRead<ReadHalf<DuplexStream>, TransporterDecoder>,
        writer: WriteHalf<DuplexStream>,
    }

    fn spawn_pipeline(
        handler: Arc<EchoHandler>,
        idle_millis: u64,
        shutdown: &Shutdown,
    ) -> (Client, tokio::task::JoinHandle<()>) {
        let mut config = ServerConfig::new("unit", 0);
        config.connection_idle_time_millis = idle_millis;
        let assembler = PipelineAssembler::new(&config, handler);

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let pipeline = assembler.assemble_io(server_read, server_write, ConnectionId::new(), None);
        let task = tokio::spawn(pipeline.run(shutdown.subscribe()));

        let (client_read, client_write) = tokio::io::split(client);
        let client = Client {
            reader: FramedRead::new(client_read, TransporterDecoder::default()),
            writer: client_write,
        };
        (client, task)
    }

    fn frame(message: Transporter) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        TransporterEncoder.encode(message, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn stages_are_installed_in_order() {
        let assembler = PipelineAssembler::new(
            &ServerConfig::default(),
            Arc::new(EchoHandler::default()),
        );
        assert_eq!(
            assembler.stages(),
            &["encoder", "decoder", "server-idle-handle", "handler"]
        );
    }

    #[tokio::test]
    async fn round_trips_through_the_pipeline() {
        let shutdown = Shutdown::new();
        let (mut client, _task) = spawn_pipeline(Arc::new(EchoHandler::default()), 0, &shutdown);

        let request = Transporter::request("echo", 11, "hello");
        client.writer.write_all(&frame(request.clone())).await.unwrap();

        let reply = client.reader.next().await.unwrap().unwrap();
        assert_eq!(reply, request.reply("hello"));
    }

    #[tokio::test]
    async fn partial_frames_wait_for_the_rest() {
        let shutdown = Shutdown::new();
        let (mut client, _task) = spawn_pipeline(Arc::new(EchoHandler::default()), 0, &shutdown);

        let bytes = frame(Transporter::request("echo", 5, "split across writes"));
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        client.writer.write_all(head).await.unwrap();

        let early = tokio::time::timeout(Duration::from_millis(50), client.reader.next()).await;
        assert!(early.is_err(), "reply before the frame was complete");

        client.writer.write_all(tail).await.unwrap();
        let reply = client.reader.next().await.unwrap().unwrap();
        assert_eq!(reply.opaque(), 5);
        assert_eq!(&reply.body[..], b"split across writes");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_notifies_handler_once() {
        let shutdown = Shutdown::new();
        let handler = Arc::new(EchoHandler::default());
        let (_client, _task) = spawn_pipeline(Arc::clone(&handler), 100, &shutdown);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handler.idle_events.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handler.idle_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn garbage_closes_the_connection() {
        let shutdown = Shutdown::new();
        let handler = Arc::new(EchoHandler::default());
        let (mut client, task) = spawn_pipeline(Arc::clone(&handler), 0, &shutdown);

        client.writer.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        task.await.unwrap();

        assert_eq!(handler.inactive.load(Ordering::SeqCst), 1);
        assert!(client.reader.next().await.is_none());
    }

    #[tokio::test]
    async fn drain_signal_ends_the_pipeline() {
        let shutdown = Shutdown::new();
        let handler = Arc::new(EchoHandler::default());
        let (_client, task) = spawn_pipeline(Arc::clone(&handler), 0, &shutdown);

        tokio::task::yield_now().await;
        shutdown.trigger();
        task.await.unwrap();
        assert_eq!(handler.inactive.load(Ordering::SeqCst), 1);
    }
}
