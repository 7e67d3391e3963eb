//! Transport traits
//!
//! The protocol only needs two things from a transport: fire a datagram at an
//! address, and send a datagram then wait a bounded time for the reply from
//! that same address. Both roles receive their transport as a value
//! implementing [`RequestChannel`].

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A connectionless endpoint able to carry one request/response at a time
#[async_trait]
pub trait RequestChannel: Send + Sync {
    /// Address this channel is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Send a datagram without waiting for anything back
    async fn send_to(&self, target: SocketAddr, data: &[u8]) -> Result<()>;

    /// Send a datagram and wait up to `wait` for the first datagram from `target`.
    ///
    /// Returns `Ok(None)` when the wait elapses; every other failure is an error.
    async fn send_and_wait(
        &self,
        target: SocketAddr,
        data: &[u8],
        wait: Duration,
    ) -> Result<Option<Vec<u8>>>;
}
