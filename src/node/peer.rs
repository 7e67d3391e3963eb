//! Peer role: join through the rendezvous, then serve ring messages.
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::identifier::Identifier;
use super::messages::{Message, Placement};
use super::ring::{RingResolver, RingState};
use crate::error::Result;
use crate::protocol_violation;
use crate::transport::{request, Inbound, RequestChannel, RetryPolicy};

/// Result of a completed join
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub is_root: bool,
    pub ring: RingState,
}

impl Membership {
    pub fn identifier(&self) -> Identifier {
        self.ring.identifier
    }
}

pub struct PeerNode<C: RequestChannel> {
    channel: Arc<C>,
    rendezvous: SocketAddr,
    policy: RetryPolicy,
}

impl<C: RequestChannel> PeerNode<C> {
    pub fn new(channel: Arc<C>, rendezvous: SocketAddr, policy: RetryPolicy) -> Self {
        Self {
            channel,
            rendezvous,
            policy,
        }
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Obtain an identifier, confirm it, and take a place on the ring.
    pub async fn join(&self) -> Result<Membership> {
        let (identifier, placement) =
            match request(self.channel.as_ref(), self.rendezvous, &Message::Hello, &self.policy)
                .await?
            {
                Message::IdentifierAssignment {
                    identifier,
                    placement,
                } => (identifier, placement),
                other => {
                    return Err(protocol_violation!(
                        "Expected an identifier from {}, got {:?}",
                        self.rendezvous,
                        other
                    ))
                }
            };

        let root = match placement {
            Placement::Root => {
                info!("Got ID {} -> is root", identifier);
                None
            }
            Placement::Join(root) => {
                info!("Got ID {}, ring root at {}", identifier, root);
                Some(root)
            }
            Placement::Unplaced => {
                return Err(protocol_violation!(
                    "Assignment of id {} carries no ring placement",
                    identifier
                ))
            }
        };

        let ack = Message::Acknowledgment { identifier };
        match request(self.channel.as_ref(), self.rendezvous, &ack, &self.policy).await? {
            Message::Acknowledgment { identifier: echoed } if echoed == identifier => {
                info!("Got an ACK from the rendezvous, registered as ID {}", identifier);
            }
            other => {
                return Err(protocol_violation!(
                    "Expected {} from {}, got {:?}",
                    ack,
                    self.rendezvous,
                    other
                ))
            }
        }

        let ring = match root {
            None => RingState::root(identifier, self.channel.local_addr()),
            Some(root) => {
                RingResolver::new(self.channel.as_ref(), self.policy)
                    .resolve(identifier, root)
                    .await?
            }
        };

        Ok(Membership {
            is_root: root.is_none(),
            ring,
        })
    }

    /// Answer ring messages arriving on `inbound` until the queue closes.
    pub async fn serve(&self, mut ring: RingState, mut inbound: Inbound) -> Result<()> {
        info!(
            "[{}] Serving ring messages at {}",
            ring.identifier,
            self.channel.local_addr()
        );
        while let Some((data, src)) = inbound.recv().await {
            let message = match Message::decode(&data) {
                Ok(message) => message,
                Err(e) => {
                    warn!("[{}] Dropping datagram from {}: {}", ring.identifier, src, e);
                    continue;
                }
            };
            if let Some(reply) = ring.handle(&message, src) {
                debug!("[{}] {} -> {}: {}", ring.identifier, message, src, reply);
                self.channel.send_to(src, &reply.encode()).await?;
            }
        }
        Ok(())
    }
}
