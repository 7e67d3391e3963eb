//! UDP channel
//!
//! The single socket a process talks through, wrapped with the receiver that
//! routes replies. Binding acquires the socket; dropping the channel stops its
//! receive task.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::error;

use super::receiver::{Inbound, UdpReceiver};
use super::traits::RequestChannel;
use crate::error::{RingJoinError, Result};

pub struct UdpChannel {
    receiver: UdpReceiver,
    inbound: Mutex<Option<Inbound>>,
    messages_sent: AtomicU64,
    send_errors: AtomicU64,
}

impl std::fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpChannel")
            .field("local_addr", &self.receiver.local_addr())
            .field("messages_sent", &self.messages_sent.load(Ordering::Relaxed))
            .field("send_errors", &self.send_errors.load(Ordering::Relaxed))
            .finish()
    }
}

impl UdpChannel {
    /// Bind a channel to `bind_addr` and start routing datagrams.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| RingJoinError::Transport(format!("Socket creation failed: {}", e)))?;
        let (receiver, inbound) = UdpReceiver::start(Arc::new(socket))?;

        Ok(Self {
            receiver,
            inbound: Mutex::new(Some(inbound)),
            messages_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
        })
    }

    /// Bind an ephemeral port of the same address family as `target`.
    pub async fn bind_for(target: SocketAddr) -> Result<Self> {
        let local_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Self::bind(local_addr).await
    }

    /// Take the queue of datagrams that were not replies. Only the first call gets it.
    pub async fn take_inbound(&self) -> Option<Inbound> {
        self.inbound.lock().await.take()
    }

    pub fn receiver(&self) -> &UdpReceiver {
        &self.receiver
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RequestChannel for UdpChannel {
    fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    async fn send_to(&self, target: SocketAddr, data: &[u8]) -> Result<()> {
        match self.receiver.socket().send_to(data, target).await {
            Ok(_write_size) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                error!("[{}] Failed to send UDP data: {}", target, e);
                Err(RingJoinError::Transport(format!(
                    "Send to {} failed: {}",
                    target, e
                )))
            }
        }
    }

    async fn send_and_wait(
        &self,
        target: SocketAddr,
        data: &[u8],
        wait: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let rx = self.receiver.expect_response_from(target).await;
        self.send_to(target, data).await?;
        self.receiver.wait_for_response(target, rx, wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_request_response() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..len], from).await.unwrap();
        });

        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let reply = channel
            .send_and_wait(server_addr, b"ACK|9", Duration::from_millis(500))
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some(&b"ACK|9"[..]));
        assert_eq!(channel.messages_sent(), 1);
    }

    #[tokio::test]
    async fn test_inbound_taken_once() {
        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(channel.take_inbound().await.is_some());
        assert!(channel.take_inbound().await.is_none());
    }

    #[tokio::test]
    async fn test_bind_for_matches_family() {
        let channel = UdpChannel::bind_for("127.0.0.1:1060".parse().unwrap())
            .await
            .unwrap();
        assert!(channel.local_addr().is_ipv4());
        assert!(channel.local_addr().port() > 0);
    }
}
