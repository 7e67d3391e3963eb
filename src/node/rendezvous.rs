//! Rendezvous role: a single loop owning one socket and the directory.
//!
//! Datagrams are handled one at a time in arrival order, so the directory is
//! never shared and needs no lock.
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::directory::MembershipDirectory;
use super::messages::Message;
use crate::error::{RingJoinError, Result};
use crate::protocol_violation;
use crate::settings::{RendezvousSettings, MAX_DATAGRAM_SIZE};

/// Protocol logic of the rendezvous, independent of the socket
#[derive(Debug)]
pub struct RendezvousService {
    directory: MembershipDirectory,
    strict_acks: bool,
}

impl RendezvousService {
    pub fn new(settings: &RendezvousSettings) -> Self {
        let directory = match settings.seed {
            Some(seed) => MembershipDirectory::seeded(settings.pool_size, seed),
            None => MembershipDirectory::new(settings.pool_size),
        };
        Self::with_directory(directory, settings.strict_acks)
    }

    pub fn with_directory(directory: MembershipDirectory, strict_acks: bool) -> Self {
        Self {
            directory,
            strict_acks,
        }
    }

    pub fn directory(&self) -> &MembershipDirectory {
        &self.directory
    }

    /// Produce the reply for one datagram.
    ///
    /// Acknowledgments are answered with the received bytes, unchanged.
    pub fn handle_datagram(&mut self, data: &[u8], src: SocketAddr) -> Result<Vec<u8>> {
        match Message::decode(data)? {
            Message::Hello => {
                let assignment = self.directory.on_hello(src)?;
                Ok(Message::IdentifierAssignment {
                    identifier: assignment.identifier,
                    placement: assignment.placement,
                }
                .encode())
            }
            Message::Acknowledgment { identifier } => {
                self.directory.on_ack(src, identifier)?;
                debug!(
                    "registered ids: {:?}",
                    self.directory
                        .records()
                        .map(|r| r.identifier.value())
                        .collect::<Vec<_>>()
                );
                Ok(data.to_vec())
            }
            other => Err(protocol_violation!(
                "Rendezvous does not handle {:?} from {}",
                other,
                src
            )),
        }
    }

    /// Decide whether an error from [`Self::handle_datagram`] stops the loop.
    ///
    /// A well-formed acknowledgment can only be rejected for an unknown
    /// identifier, which is fatal under `strict_acks`.
    fn is_fatal(&self, data: &[u8], err: &RingJoinError) -> bool {
        match err {
            RingJoinError::ProtocolViolation(_) => {
                self.strict_acks
                    && matches!(Message::decode(data), Ok(Message::Acknowledgment { .. }))
            }
            other => !other.is_per_request(),
        }
    }
}

pub struct RendezvousNode {
    socket: UdpSocket,
    service: RendezvousService,
}

impl RendezvousNode {
    pub async fn bind(settings: &RendezvousSettings) -> Result<Self> {
        let socket = UdpSocket::bind(settings.listen)
            .await
            .map_err(|e| RingJoinError::Transport(format!("Socket creation failed: {}", e)))?;
        Ok(Self {
            socket,
            service: RendezvousService::new(settings),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn service(&self) -> &RendezvousService {
        &self.service
    }

    /// Serve datagrams until a fatal error. Receive errors are logged and skipped.
    pub async fn run(mut self) -> Result<()> {
        info!("Listening at {}", self.local_addr()?);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("UDP receive error: {}", e);
                    continue;
                }
            };

            match self.service.handle_datagram(&buf[..len], src) {
                Ok(reply) => {
                    if let Err(e) = self.socket.send_to(&reply, src).await {
                        // the peer will retry; nothing to undo here
                        warn!("[{}] Failed to send reply: {}", src, e);
                    }
                }
                Err(e) if self.service.is_fatal(&buf[..len], &e) => {
                    error!("[{}] Stopping rendezvous: {}", src, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("[{}] Dropping datagram: {}", src, e);
                }
            }
        }
    }
}
