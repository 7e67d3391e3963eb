//! UDP Receiver
//!
//! Owns the receive half of a UDP socket. Each datagram is either handed to a
//! task waiting for a reply from that source address, or pushed onto the
//! inbound queue for the serving loop.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, trace};

use crate::error::{RingJoinError, Result};
use crate::settings::MAX_DATAGRAM_SIZE;

type Waiters = Arc<Mutex<HashMap<SocketAddr, Vec<oneshot::Sender<Vec<u8>>>>>>;

/// Inbound datagrams nobody was waiting for
pub type Inbound = mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>;

/// UDP message receiver routing replies to their waiters
pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    stats: Arc<ReceiverStats>,
    pending_responses: Waiters,
    task: JoinHandle<()>,
}

/// Statistics for the receiver
#[derive(Debug, Default)]
pub struct ReceiverStats {
    pub messages_received: AtomicU64,
    pub responses_routed: AtomicU64,
    pub receive_errors: AtomicU64,
}

impl UdpReceiver {
    /// Start receiving on `socket`; datagrams without a waiter go to the returned queue.
    pub fn start(socket: Arc<UdpSocket>) -> Result<(Self, Inbound)> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| RingJoinError::Transport(format!("Socket has no local address: {}", e)))?;

        let stats = Arc::new(ReceiverStats::default());
        let pending_responses: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&stats),
            Arc::clone(&pending_responses),
            tx,
        ));

        Ok((
            Self {
                socket,
                local_addr,
                stats,
                pending_responses,
                task,
            },
            rx,
        ))
    }

    /// Get the local socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    /// Register interest in the next datagram from `peer`.
    ///
    /// Register before sending the request so a fast reply is not mistaken
    /// for an inbound request.
    pub async fn expect_response_from(&self, peer: SocketAddr) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending_responses.lock().await;
        pending.entry(peer).or_insert_with(Vec::new).push(tx);
        rx
    }

    /// Wait for a response registered with [`Self::expect_response_from`].
    ///
    /// Returns `Ok(None)` on timeout, after dropping the waiters for `peer`.
    pub async fn wait_for_response(
        &self,
        peer: SocketAddr,
        rx: oneshot::Receiver<Vec<u8>>,
        timeout_duration: Duration,
    ) -> Result<Option<Vec<u8>>> {
        match timeout(timeout_duration, rx).await {
            Ok(Ok(data)) => Ok(Some(data)),
            Ok(Err(_)) => Err(RingJoinError::Transport(
                "Response channel closed".to_string(),
            )),
            Err(_) => {
                let mut pending = self.pending_responses.lock().await;
                if let Some(waiters) = pending.get_mut(&peer) {
                    waiters.clear();
                    if waiters.is_empty() {
                        pending.remove(&peer);
                    }
                }
                Ok(None)
            }
        }
    }

    /// Get receiver statistics
    pub fn get_stats(&self) -> ReceiverStats {
        ReceiverStats {
            messages_received: AtomicU64::new(self.stats.messages_received.load(Ordering::Relaxed)),
            responses_routed: AtomicU64::new(self.stats.responses_routed.load(Ordering::Relaxed)),
            receive_errors: AtomicU64::new(self.stats.receive_errors.load(Ordering::Relaxed)),
        }
    }

}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    stats: Arc<ReceiverStats>,
    pending_responses: Waiters,
    tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => {
                let data = buf[..len].to_vec();
                stats.messages_received.fetch_add(1, Ordering::Relaxed);

                // Check if this is a response to a pending request
                let mut pending = pending_responses.lock().await;
                if let Some(waiters) = pending.get_mut(&addr) {
                    if let Some(waiter) = waiters.pop() {
                        if waiters.is_empty() {
                            pending.remove(&addr);
                        }
                        drop(pending); // Release lock before sending

                        stats.responses_routed.fetch_add(1, Ordering::Relaxed);
                        let _ = waiter.send(data);
                        continue;
                    }
                }
                drop(pending);

                trace!("Queueing {} byte datagram from {}", len, addr);
                // Receiver dropped, exit the task
                if tx.send((data, addr)).is_err() {
                    break;
                }
            }
            Err(e) => {
                stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                error!("UDP receive error: {}", e);
            }
        }
    }
}
