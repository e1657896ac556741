//! Raw byte stream handed off after a protocol upgrade.
//!
//! Once a connection becomes an [`UpgradedChannel`] the HTTP layer and the
//! pool never read, write or close it again. Whoever holds the channel owns
//! its lifetime and all further framing.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::connection::{ConnectionId, Transport};

/// Bidirectional stream left over after `101 Switching Protocols`.
///
/// Bytes the HTTP reader had already buffered past the 101 head are the
/// first bytes of the new protocol and are yielded before the socket is read.
pub struct UpgradedChannel {
    id: ConnectionId,
    authority: String,
    pending: Bytes,
    io: Box<dyn Transport>,
}

impl std::fmt::Debug for UpgradedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradedChannel")
            .field("id", &self.id)
            .field("authority", &self.authority)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl UpgradedChannel {
    pub(crate) fn new(
        id: ConnectionId,
        authority: String,
        pending: Bytes,
        io: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            authority,
            pending,
            io,
        }
    }

    /// ID of the connection this channel was extracted from.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The upstream `host:port`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Upgraded-protocol bytes received together with the 101 head and not yet read.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Split into the raw stream and any bytes already read from it.
    pub fn into_parts(self) -> (Box<dyn Transport>, Bytes) {
        (self.io, self.pending)
    }
}

impl AsyncRead for UpgradedChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.pending.is_empty() {
            let n = this.pending.len().min(buf.remaining());
            let chunk = this.pending.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for UpgradedChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn pending_bytes_come_before_socket_bytes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel = UpgradedChannel::new(
            ConnectionId::next(),
            "test:80".into(),
            Bytes::from_static(b"early"),
            Box::new(client),
        );

        server.write_all(b"-late").await.unwrap();
        drop(server);

        let mut out = Vec::new();
        channel.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"early-late");
    }

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel =
            UpgradedChannel::new(ConnectionId::next(), "test:80".into(), Bytes::new(), Box::new(client));

        channel.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn into_parts_returns_unread_bytes_and_the_stream() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel = UpgradedChannel::new(
            ConnectionId::next(),
            "test:80".into(),
            Bytes::from_static(b"abcdef"),
            Box::new(client),
        );

        let mut first = [0u8; 2];
        channel.read_exact(&mut first).await.unwrap();
        assert_eq!(channel.pending(), b"cdef");

        let (mut io, pending) = channel.into_parts();
        assert_eq!(&pending[..], b"cdef");

        io.write_all(b"raw").await.unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"raw");
    }
}
