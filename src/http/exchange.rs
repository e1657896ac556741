//! Per-exchange state.
//!
//! Holds the upgraded channel slot. The slot starts empty, is filled at most
//! once by [`ConnectionDispositionPolicy`](crate::http::ConnectionDispositionPolicy),
//! and is never cleared.

use std::cell::OnceCell;

use crate::net::UpgradedChannel;

/// One request/response exchange on one upstream connection.
#[derive(Debug, Default)]
pub struct Exchange {
    upgraded: OnceCell<UpgradedChannel>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the channel extracted on upgrade.
    ///
    /// # Panics
    /// If a channel was already stored. A second handoff on one exchange is a bug.
    pub(crate) fn hand_off(&self, channel: UpgradedChannel) {
        if let Err(channel) = self.upgraded.set(channel) {
            panic!(
                "exchange already holds an upgraded channel; refusing second handoff of {}",
                channel.id()
            );
        }
    }

    /// The channel handed off by a `101 Switching Protocols` response, if any.
    ///
    /// Returns the same handle on every call.
    pub fn upgraded_channel(&self) -> Option<&UpgradedChannel> {
        self.upgraded.get()
    }

    /// Mutable access for reading and writing the channel in place.
    pub fn upgraded_channel_mut(&mut self) -> Option<&mut UpgradedChannel> {
        self.upgraded.get_mut()
    }

    /// Take ownership of the channel, ending the exchange.
    pub fn into_upgraded_channel(self) -> Option<UpgradedChannel> {
        self.upgraded.into_inner()
    }

    pub fn is_upgraded(&self) -> bool {
        self.upgraded.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TransportConnection;
    use std::time::Duration;

    fn channel() -> UpgradedChannel {
        let (client, _server) = tokio::io::duplex(64);
        TransportConnection::new(client, "test:80", Duration::from_secs(1)).into_upgraded()
    }

    #[test]
    fn starts_empty() {
        let exchange = Exchange::new();
        assert!(exchange.upgraded_channel().is_none());
        assert!(!exchange.is_upgraded());
        assert!(exchange.into_upgraded_channel().is_none());
    }

    #[test]
    fn accessor_returns_the_same_handle() {
        let exchange = Exchange::new();
        let ch = channel();
        let id = ch.id();
        exchange.hand_off(ch);

        let first = exchange.upgraded_channel().unwrap();
        let second = exchange.upgraded_channel().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.id(), id);
        assert_eq!(exchange.into_upgraded_channel().unwrap().id(), id);
    }

    #[tokio::test]
    async fn channel_is_usable_in_place() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (client, mut server) = tokio::io::duplex(64);
        let mut exchange = Exchange::new();
        exchange.hand_off(TransportConnection::new(client, "test:80", Duration::from_secs(1)).into_upgraded());

        let channel = exchange.upgraded_channel_mut().unwrap();
        channel.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        server.write_all(b"yo").await.unwrap();
        exchange.upgraded_channel_mut().unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"yo");
        assert!(exchange.is_upgraded());
    }

    #[test]
    #[should_panic(expected = "refusing second handoff")]
    fn second_handoff_panics() {
        let exchange = Exchange::new();
        exchange.hand_off(channel());
        exchange.hand_off(channel());
    }
}
