//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use remoting_server::protocol::{TransporterDecoder, TransporterEncoder};
use remoting_server::{RemotingServer, ServerConfig, Transporter};

static NEXT_SERVER: AtomicU16 = AtomicU16::new(0);

/// Config for a test server on an ephemeral port with short timeouts.
pub fn test_config(name: &str) -> ServerConfig {
    let id = NEXT_SERVER.fetch_add(1, Ordering::Relaxed);
    let mut config = ServerConfig::new(format!("{}-{}", name, id), 0);
    config.worker_threads = 2;
    config.shutdown_grace_millis = 300;
    config
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("0.0.0.0", 0)).expect("no ephemeral port");
    listener.local_addr().expect("no local addr").port()
}

/// Loopback address of a started server.
pub fn server_addr(server: &RemotingServer) -> SocketAddr {
    let port = server.local_addr().expect("server is not bound").port();
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Blocking client speaking the transporter framing.
pub struct RpcClient {
    stream: TcpStream,
    decoder: TransporterDecoder,
    buffer: BytesMut,
    next_opaque: u64,
}

impl RpcClient {
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            stream,
            decoder: TransporterDecoder::default(),
            buffer: BytesMut::new(),
            next_opaque: 1,
        })
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))
    }

    pub fn send(&mut self, method: &str, body: &[u8]) -> io::Result<u64> {
        let opaque = self.next_opaque;
        self.next_opaque += 1;

        let mut frame = BytesMut::new();
        TransporterEncoder
            .encode(
                Transporter::request(method, opaque, body.to_vec()),
                &mut frame,
            )
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.stream.write_all(&frame)?;
        Ok(opaque)
    }

    /// Read the next frame. `Ok(None)` means the server closed the connection.
    pub fn recv(&mut self) -> io::Result<Option<Transporter>> {
        loop {
            if let Some(message) = self
                .decoder
                .decode(&mut self.buffer)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
            {
                return Ok(Some(message));
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn call(&mut self, method: &str, body: &[u8]) -> io::Result<Transporter> {
        let opaque = self.send(method, body)?;
        let reply = self
            .recv()?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))?;
        assert_eq!(reply.opaque(), opaque, "reply correlated to the wrong request");
        Ok(reply)
    }
}
