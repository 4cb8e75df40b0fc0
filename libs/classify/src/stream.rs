//! Classified connection stream.
//!
//! The classifier consumes the leading bytes of a connection to decide its
//! class. Those bytes belong to the client's payload, so a [`MuxStream`]
//! replays them before reading further from the socket.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Bytes already read from a socket, handed out before the socket itself.
#[derive(Debug, Default)]
struct Replay {
    buf: Vec<u8>,
    pos: usize,
}

impl Replay {
    fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Copy pending bytes into `out`. Returns false once drained.
    fn fill(&mut self, out: &mut ReadBuf<'_>) -> bool {
        let pending = self.remaining();
        if pending.is_empty() {
            return false;
        }
        let n = pending.len().min(out.remaining());
        out.put_slice(&pending[..n]);
        self.pos += n;
        if self.pos == self.buf.len() {
            // Release the sniff buffer once replayed.
            self.buf = Vec::new();
            self.pos = 0;
        }
        true
    }
}

/// A TCP connection accepted through a classified listener.
#[derive(Debug)]
pub struct MuxStream {
    replay: Replay,
    inner: TcpStream,
}

impl MuxStream {
    /// Wrap `inner`, replaying `sniffed` before any further socket reads.
    pub fn new(inner: TcpStream, sniffed: Vec<u8>) -> Self {
        Self {
            replay: Replay::new(sniffed),
            inner,
        }
    }

    /// Bytes consumed during classification that have not been read yet.
    pub fn sniffed(&self) -> &[u8] {
        self.replay.remaining()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }

    /// Split into owned halves that can move to separate tasks.
    pub fn into_split(self) -> (MuxReadHalf, OwnedWriteHalf) {
        let (read, write) = self.inner.into_split();
        (
            MuxReadHalf {
                replay: self.replay,
                inner: read,
            },
            write,
        )
    }
}

impl AsyncRead for MuxStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.replay.fill(buf) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MuxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Read half of a [`MuxStream`].
#[derive(Debug)]
pub struct MuxReadHalf {
    replay: Replay,
    inner: OwnedReadHalf,
}

impl AsyncRead for MuxReadHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.replay.fill(buf) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}
