//! Deadline-bounded byte stream for binkp sessions.
//!
//! Wraps any `AsyncRead + AsyncWrite` stream (TCP in production, in-memory
//! duplex pipes in tests) and exposes the blocking primitives a session
//! needs: exact reads, full writes and network-order integers, each bounded
//! by an explicit timeout.

use std::fmt;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use log::debug;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf,
};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until, timeout, timeout_at};

use super::error::{TransportError, TransportResult};
use crate::core::FAREWELL_TIMEOUT;

/// Size of the scratch buffer used for each socket read.
pub const READ_CHUNK_SIZE: usize = 8192;

/// Transport over a TCP connection.
pub type TcpTransport = Transport<TcpStream>;

/// Handle for closing a [`Transport`] from outside the session task.
///
/// Closing makes every in-flight and future `receive`/`send` fail with
/// [`TransportError::Closed`].
#[derive(Debug, Clone)]
pub struct TransportCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl TransportCloser {
    /// Close the transport. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Check if the transport was closed.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A byte stream with deadline-bounded reads and writes.
///
/// Inbound bytes are buffered internally. While a `send` waits for the
/// socket to become writable it keeps draining readable bytes into that
/// buffer. Two peers that are both inside `send` therefore make progress;
/// once one of them returns it has to keep reading for the other to finish.
pub struct Transport<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    /// Bytes read from the socket but not consumed yet.
    rx: Vec<u8>,
    scratch: Vec<u8>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    read_eof: bool,
    shut_down: bool,
    peer: String,
    bytes_read: u64,
    bytes_written: u64,
}

impl<S> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("buffered", &self.rx.len())
            .field("closed", &*self.closed_rx.borrow())
            .field("bytes_read", &self.bytes_read)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

impl Transport<TcpStream> {
    /// Connect to `host:port`, trying every resolved address in turn.
    pub async fn connect(host: &str, port: u16, limit: Duration) -> TransportResult<Self> {
        let connect_error = |reason: String| TransportError::Connect {
            host: host.to_string(),
            port,
            reason,
        };

        let addrs = match timeout(limit, lookup_host((host, port))).await {
            Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
            Ok(Err(e)) => return Err(connect_error(e.to_string())),
            Err(_) => return Err(connect_error("name resolution timed out".into())),
        };
        if addrs.is_empty() {
            return Err(connect_error("no addresses resolved".into()));
        }

        let mut last_error = String::new();
        for addr in addrs {
            debug!("connecting to {} ({})", host, addr);
            match timeout(limit, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(Self::from_tcp(stream)),
                Ok(Err(e)) => last_error = format!("{}: {}", addr, e),
                Err(_) => last_error = format!("{}: timed out", addr),
            }
        }
        Err(connect_error(last_error))
    }

    /// Wrap an accepted or connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::new(stream, peer)
    }
}

impl<S: AsyncRead + AsyncWrite> Transport<S> {
    /// Wrap a stream. `peer` labels the transport in logs.
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            reader,
            writer,
            rx: Vec::new(),
            scratch: vec![0u8; READ_CHUNK_SIZE],
            closed_tx: Arc::new(closed_tx),
            closed_rx,
            read_eof: false,
            shut_down: false,
            peer: peer.into(),
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Label of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Total bytes read from the socket.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total bytes written to the socket.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get a handle that closes this transport out-of-band.
    pub fn closer(&self) -> TransportCloser {
        TransportCloser {
            tx: Arc::clone(&self.closed_tx),
        }
    }

    /// Check if the transport was closed.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Fill `buf` completely, waiting at most `limit`.
    pub async fn receive(&mut self, buf: &mut [u8], limit: Duration) -> TransportResult<usize> {
        let deadline = Instant::now() + limit;
        self.fill(buf.len(), deadline, limit).await?;
        buf.copy_from_slice(&self.rx[..buf.len()]);
        self.rx.drain(..buf.len());
        Ok(buf.len())
    }

    /// Read exactly `size` bytes, waiting at most `limit`.
    pub async fn receive_exact(&mut self, size: usize, limit: Duration) -> TransportResult<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.receive(&mut buf, limit).await?;
        Ok(buf)
    }

    /// Read one byte.
    pub async fn read_u8(&mut self, limit: Duration) -> TransportResult<u8> {
        let mut buf = [0u8; 1];
        self.receive(&mut buf, limit).await?;
        Ok(buf[0])
    }

    /// Read a big-endian u16.
    pub async fn read_u16(&mut self, limit: Duration) -> TransportResult<u16> {
        let mut buf = [0u8; 2];
        self.receive(&mut buf, limit).await?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Write all of `buf`, waiting at most `limit`.
    pub async fn send(&mut self, buf: &[u8], limit: Duration) -> TransportResult<usize> {
        let deadline = Instant::now() + limit;
        let mut written = 0;
        while written < buf.len() {
            self.ensure_open()?;
            tokio::select! {
                biased;
                _ = closed(&mut self.closed_rx) => return Err(TransportError::Closed),
                _ = sleep_until(deadline) => return Err(TransportError::Timeout(limit)),
                res = self.writer.write(&buf[written..]) => {
                    let n = res?;
                    if n == 0 {
                        return Err(TransportError::Closed);
                    }
                    written += n;
                    self.bytes_written += n as u64;
                }
                res = self.reader.read(&mut self.scratch), if !self.read_eof => {
                    match res? {
                        0 => self.read_eof = true,
                        n => self.buffer_inbound(n),
                    }
                }
            }
        }
        match timeout_at(deadline, self.writer.flush()).await {
            Ok(res) => res?,
            Err(_) => return Err(TransportError::Timeout(limit)),
        }
        Ok(written)
    }

    /// Write one byte.
    pub async fn send_u8(&mut self, value: u8, limit: Duration) -> TransportResult<()> {
        self.send(&[value], limit).await.map(|_| ())
    }

    /// Write a big-endian u16.
    pub async fn send_u16(&mut self, value: u16, limit: Duration) -> TransportResult<()> {
        self.send(&value.to_be_bytes(), limit).await.map(|_| ())
    }

    /// Move every immediately readable byte into the receive buffer.
    ///
    /// Never waits. Returns the number of bytes added; end-of-stream is left
    /// for the next blocking read to report.
    pub async fn poll_ready(&mut self) -> TransportResult<usize> {
        self.ensure_open()?;
        let mut total = 0;
        while !self.read_eof {
            let reader = &mut self.reader;
            let scratch = &mut self.scratch;
            let polled = poll_fn(|cx| {
                let mut buf = ReadBuf::new(scratch);
                match Pin::new(&mut *reader).poll_read(cx, &mut buf) {
                    Poll::Pending => Poll::Ready(None),
                    Poll::Ready(Ok(())) => Poll::Ready(Some(Ok(buf.filled().len()))),
                    Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
                }
            })
            .await;
            match polled {
                None => break,
                Some(Ok(0)) => self.read_eof = true,
                Some(Ok(n)) => {
                    self.buffer_inbound(n);
                    total += n;
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Bytes received but not consumed yet.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.rx
    }

    /// Drop `n` bytes from the front of the receive buffer.
    pub(crate) fn consume(&mut self, n: usize) {
        self.rx.drain(..n);
    }

    /// Shut down the write side and mark the transport closed. Idempotent.
    pub async fn close(&mut self) {
        if !self.shut_down {
            self.shut_down = true;
            if let Err(e) = self.shutdown_writer().await {
                debug!("shutdown of {} failed: {}", self.peer, e);
            }
        }
        self.closed_tx.send_replace(true);
    }

    async fn shutdown_writer(&mut self) -> io::Result<()> {
        match timeout(FAREWELL_TIMEOUT, self.writer.shutdown()).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "shutdown timed out")),
        }
    }

    async fn fill(&mut self, needed: usize, deadline: Instant, limit: Duration) -> TransportResult<()> {
        while self.rx.len() < needed {
            self.ensure_open()?;
            if self.read_eof {
                return Err(TransportError::Closed);
            }
            let read = tokio::select! {
                biased;
                _ = closed(&mut self.closed_rx) => return Err(TransportError::Closed),
                res = timeout_at(deadline, self.reader.read(&mut self.scratch)) => res,
            };
            match read {
                Err(_) => return Err(TransportError::Timeout(limit)),
                Ok(Ok(0)) => {
                    self.read_eof = true;
                    return Err(TransportError::Closed);
                }
                Ok(Ok(n)) => self.buffer_inbound(n),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn buffer_inbound(&mut self, n: usize) {
        self.rx.extend_from_slice(&self.scratch[..n]);
        self.bytes_read += n as u64;
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if *self.closed_rx.borrow() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Resolves once the closed flag is raised.
async fn closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::net::TcpListener;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    fn pair(capacity: usize) -> (Transport<DuplexStream>, DuplexStream) {
        let (a, b) = duplex(capacity);
        (Transport::new(a, "test"), b)
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let (mut transport, _peer) = pair(64);
        let mut buf = [0u8; 4];
        let err = transport.receive(&mut buf, SHORT).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == SHORT));
    }

    #[tokio::test]
    async fn test_partial_data_still_times_out() {
        let (mut transport, mut peer) = pair(64);
        peer.write_all(&[1, 2]).await.unwrap();
        let mut buf = [0u8; 4];
        let err = transport.receive(&mut buf, SHORT).await.unwrap_err();
        assert!(err.is_timeout());

        // The two bytes stay buffered for the next read.
        peer.write_all(&[3, 4]).await.unwrap();
        transport.receive(&mut buf, LONG).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_typed_reads_network_order() {
        let (mut transport, mut peer) = pair(64);
        peer.write_all(&[0x12, 0x34, 0xAB]).await.unwrap();
        assert_eq!(transport.read_u16(LONG).await.unwrap(), 0x1234);
        assert_eq!(transport.read_u8(LONG).await.unwrap(), 0xAB);
    }

    #[tokio::test]
    async fn test_typed_writes_network_order() {
        let (mut transport, mut peer) = pair(64);
        transport.send_u16(0x8001, LONG).await.unwrap();
        transport.send_u8(0x04, LONG).await.unwrap();

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x80, 0x01, 0x04]);
        assert_eq!(transport.bytes_written(), 3);
    }

    #[tokio::test]
    async fn test_receive_after_peer_close() {
        let (mut transport, peer) = pair(64);
        drop(peer);
        let err = transport.read_u8(LONG).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_closer_interrupts_receive() {
        let (mut transport, _peer) = pair(64);
        let closer = transport.closer();
        let reader = tokio::spawn(async move { transport.read_u16(LONG).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close();
        assert!(closer.is_closed());

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_send_drains_inbound_while_blocked() {
        // Both ends write more than the pipe holds before reading anything.
        let (a, b) = duplex(16);
        let mut left = Transport::new(a, "left");
        let mut right = Transport::new(b, "right");
        let payload = vec![0x5Au8; 256];

        let (l, r) = tokio::join!(
            async {
                let sent = left.send(&payload, LONG).await.unwrap();
                (sent, left.receive_exact(256, LONG).await.unwrap())
            },
            async {
                let sent = right.send(&payload, LONG).await.unwrap();
                (sent, right.receive_exact(256, LONG).await.unwrap())
            },
        );
        assert_eq!(l, (256, payload.clone()));
        assert_eq!(r, (256, payload));
    }

    #[tokio::test]
    async fn test_poll_ready_never_blocks() {
        let (mut transport, mut peer) = pair(64);
        assert_eq!(transport.poll_ready().await.unwrap(), 0);

        peer.write_all(b"abc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.poll_ready().await.unwrap(), 3);
        assert_eq!(transport.buffered(), b"abc");
        transport.consume(1);
        assert_eq!(transport.buffered(), b"bc");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut transport, mut peer) = pair(64);
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(
            transport.send(b"x", LONG).await,
            Err(TransportError::Closed)
        ));

        let mut buf = Vec::new();
        assert_eq!(peer.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Transport::connect("127.0.0.1", port, LONG).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = Transport::from_tcp(stream);
            let value = transport.read_u16(LONG).await.unwrap();
            transport.send_u16(value + 1, LONG).await.unwrap();
        });

        let mut client = Transport::connect("127.0.0.1", port, LONG).await.unwrap();
        client.send_u16(41, LONG).await.unwrap();
        assert_eq!(client.read_u16(LONG).await.unwrap(), 42);
        server.await.unwrap();
    }
}
