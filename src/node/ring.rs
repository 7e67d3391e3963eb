//! Ring position: resolution for a joining peer, and the links a member serves.
//!
//! A joiner walks the ring from the root, asking each member for its
//! identifier and links, until its own identifier falls between a member and
//! that member's successor. It then splices itself in by telling the affected
//! members to update their links. Every update is idempotent so it can go
//! through the retrying exchange.
use std::collections::HashSet;
use std::net::SocketAddr;

use tracing::{debug, info};

use super::identifier::Identifier;
use super::messages::{Endpoint, Message};
use crate::error::Result;
use crate::protocol_violation;
use crate::transport::{request, RequestChannel, RetryPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingPosition {
    pub successor: SocketAddr,
    pub successor_of_successor: SocketAddr,
    pub predecessor: SocketAddr,
}

impl RingPosition {
    /// Position of the only ring member: every link points back at itself.
    pub fn solitary(own: SocketAddr) -> Self {
        Self {
            successor: own,
            successor_of_successor: own,
            predecessor: own,
        }
    }
}

/// What a ring member knows about itself and its neighbors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingState {
    pub identifier: Identifier,
    pub local_addr: SocketAddr,
    pub successor_identifier: Identifier,
    pub position: RingPosition,
}

impl RingState {
    /// State of the root, alone on the ring.
    pub fn root(identifier: Identifier, local_addr: SocketAddr) -> Self {
        Self {
            identifier,
            local_addr,
            successor_identifier: identifier,
            position: RingPosition::solitary(local_addr),
        }
    }

    fn endpoint(&self, addr: SocketAddr) -> Endpoint {
        Endpoint::relative_to(addr, self.local_addr)
    }

    /// Answer a ring message from `src`. Returns the reply, if any.
    pub fn handle(&mut self, message: &Message, src: SocketAddr) -> Option<Message> {
        match message {
            Message::Query => Some(Message::Info {
                identifier: self.identifier,
                successor_identifier: self.successor_identifier,
                successor: self.endpoint(self.position.successor),
                successor_of_successor: self.endpoint(self.position.successor_of_successor),
                predecessor: self.endpoint(self.position.predecessor),
            }),
            Message::SetPredecessor => {
                if self.position.predecessor != src {
                    info!("[{}] predecessor is now {}", self.identifier, src);
                }
                self.position.predecessor = src;
                Some(message.clone())
            }
            Message::SetSuccessor {
                identifier,
                successor_of_successor,
            } => {
                if self.position.successor != src {
                    info!(
                        "[{}] successor is now {} (id {})",
                        self.identifier, src, identifier
                    );
                }
                self.position.successor = src;
                self.successor_identifier = *identifier;
                self.position.successor_of_successor =
                    successor_of_successor.resolve(self.local_addr);
                Some(message.clone())
            }
            Message::SetSuccessorOfSuccessor => {
                self.position.successor_of_successor = src;
                Some(message.clone())
            }
            other => {
                debug!(
                    "[{}] ignoring {:?} from {}, not a ring message",
                    self.identifier, other, src
                );
                None
            }
        }
    }
}

/// Walks the ring on behalf of a joining peer
pub struct RingResolver<'a, C: RequestChannel + ?Sized> {
    channel: &'a C,
    policy: RetryPolicy,
}

impl<'a, C: RequestChannel + ?Sized> RingResolver<'a, C> {
    pub fn new(channel: &'a C, policy: RetryPolicy) -> Self {
        Self { channel, policy }
    }

    async fn query(&self, member: SocketAddr) -> Result<Info> {
        match request(self.channel, member, &Message::Query, &self.policy).await? {
            Message::Info {
                identifier,
                successor_identifier,
                successor,
                successor_of_successor,
                predecessor,
            } => Ok(Info {
                identifier,
                successor_identifier,
                successor: successor.resolve(member),
                successor_of_successor: successor_of_successor.resolve(member),
                predecessor: predecessor.resolve(member),
            }),
            other => Err(protocol_violation!(
                "Expected INFO from {}, got {:?}",
                member,
                other
            )),
        }
    }

    /// Send an update and require it to be echoed back.
    ///
    /// The first datagram from `member` is taken as the echo. A late duplicate
    /// `INFO` from a retried `QUERY` to the same member therefore fails the join.
    async fn notify(&self, member: SocketAddr, update: Message) -> Result<()> {
        let reply = request(self.channel, member, &update, &self.policy).await?;
        if reply != update {
            return Err(protocol_violation!(
                "{} answered {} with {}",
                member,
                update,
                reply
            ));
        }
        Ok(())
    }

    /// Find the place of `own` on the ring reachable from `root` and splice in.
    pub async fn resolve(&self, own: Identifier, root: SocketAddr) -> Result<RingState> {
        let local_addr = self.channel.local_addr();
        let mut candidate = root;
        let mut visited = HashSet::new();

        // a consistent ring always has a gap for `own` before the walk loops
        while visited.insert(candidate) {
            let info = self.query(candidate).await?;
            debug!(
                "[{}] hop {}: {} has id {}, successor id {}",
                own,
                visited.len(),
                candidate,
                info.identifier,
                info.successor_identifier
            );
            if info.identifier == own {
                return Err(protocol_violation!(
                    "{} already holds id {}",
                    candidate,
                    own
                ));
            }
            if !own.is_between(info.identifier, info.successor_identifier) {
                candidate = info.successor;
                continue;
            }

            let alone = info.successor == candidate;
            let successor = info.successor;
            let successor_of_successor = if alone {
                local_addr
            } else {
                info.successor_of_successor
            };

            self.notify(successor, Message::SetPredecessor).await?;
            self.notify(
                candidate,
                Message::SetSuccessor {
                    identifier: own,
                    successor_of_successor: Endpoint::relative_to(successor, candidate),
                },
            )
            .await?;
            if info.predecessor != candidate {
                self.notify(info.predecessor, Message::SetSuccessorOfSuccessor)
                    .await?;
            }

            let state = RingState {
                identifier: own,
                local_addr,
                successor_identifier: info.successor_identifier,
                position: RingPosition {
                    successor,
                    successor_of_successor,
                    predecessor: candidate,
                },
            };
            info!(
                "[{}] placed between {} (id {}) and {} (id {})",
                own, candidate, info.identifier, successor, info.successor_identifier
            );
            return Ok(state);
        }

        Err(protocol_violation!(
            "No place for id {} after walking {} members from {}",
            own,
            visited.len(),
            root
        ))
    }
}

/// A member's answer to `QUERY`, with links resolved to addresses
#[derive(Clone, Copy, Debug)]
struct Info {
    identifier: Identifier,
    successor_identifier: Identifier,
    successor: SocketAddr,
    successor_of_successor: SocketAddr,
    predecessor: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RingJoinError;
    use crate::transport::scripted::ScriptedChannel;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_root_answers_with_owner_links() {
        let mut root = RingState::root(Identifier::new(20), addr(4000));
        let reply = root.handle(&Message::Query, addr(4001)).unwrap();
        assert_eq!(reply.to_string(), "INFO|20|20|self|self|self");
    }

    #[test]
    fn test_updates_are_echoed_and_applied() {
        let mut state = RingState::root(Identifier::new(20), addr(4000));

        let pred = state.handle(&Message::SetPredecessor, addr(4001)).unwrap();
        assert_eq!(pred, Message::SetPredecessor);

        let succ = Message::SetSuccessor {
            identifier: Identifier::new(35),
            successor_of_successor: Endpoint::Owner,
        };
        assert_eq!(state.handle(&succ, addr(4001)), Some(succ.clone()));

        assert_eq!(
            state.position,
            RingPosition {
                successor: addr(4001),
                successor_of_successor: addr(4000),
                predecessor: addr(4001),
            }
        );
        assert_eq!(state.successor_identifier, Identifier::new(35));

        // applying the same update twice changes nothing
        let before = state.clone();
        state.handle(&succ, addr(4001));
        assert_eq!(state, before);

        let reply = state.handle(&Message::Query, addr(4002)).unwrap();
        assert_eq!(
            reply.to_string(),
            "INFO|20|35|127.0.0.1:4001|self|127.0.0.1:4001"
        );
    }

    #[test]
    fn test_successor_of_successor_update() {
        let mut state = RingState::root(Identifier::new(1), addr(4000));
        state.handle(&Message::SetSuccessorOfSuccessor, addr(4009));
        assert_eq!(state.position.successor_of_successor, addr(4009));
        assert_eq!(state.position.successor, addr(4000));
    }

    #[test]
    fn test_non_ring_messages_ignored() {
        let mut state = RingState::root(Identifier::new(1), addr(4000));
        assert!(state.handle(&Message::Hello, addr(4001)).is_none());
        assert!(state
            .handle(
                &Message::Acknowledgment {
                    identifier: Identifier::new(1)
                },
                addr(4001)
            )
            .is_none());
    }

    async fn resolve_with(
        replies: &[&str],
        own: u32,
    ) -> (ScriptedChannel, Result<RingState>) {
        let channel = ScriptedChannel::new(addr(4000), replies);
        let result = RingResolver::new(&channel, RetryPolicy::default())
            .resolve(Identifier::new(own), addr(5000))
            .await;
        (channel, result)
    }

    #[tokio::test]
    async fn test_splice_between_two_members() {
        // ring 10 (5000) -> 20 (5001) -> 30 (5002) -> 10, joiner 25
        let (channel, result) = resolve_with(
            &[
                "INFO|10|20|127.0.0.1:5001|127.0.0.1:5002|127.0.0.1:5002",
                "INFO|20|30|127.0.0.1:5002|127.0.0.1:5000|127.0.0.1:5000",
                "PRED",
                "SUCC|25|127.0.0.1:5002",
                "SUCC2",
            ],
            25,
        )
        .await;

        let state = result.unwrap();
        assert_eq!(state.successor_identifier, Identifier::new(30));
        assert_eq!(
            state.position,
            RingPosition {
                successor: addr(5002),
                successor_of_successor: addr(5000),
                predecessor: addr(5001),
            }
        );
        assert_eq!(
            channel.sent(),
            vec![
                (addr(5000), "QUERY".to_string()),
                (addr(5001), "QUERY".to_string()),
                (addr(5002), "PRED".to_string()),
                (addr(5001), "SUCC|25|127.0.0.1:5002".to_string()),
                (addr(5000), "SUCC2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_member_with_same_identifier() {
        let (_, result) =
            resolve_with(&["INFO|15|20|127.0.0.1:5001|self|127.0.0.1:5001"], 15).await;
        assert!(matches!(result, Err(RingJoinError::ProtocolViolation(msg)) if msg.contains("already holds")));
    }

    #[tokio::test]
    async fn test_walk_stops_when_it_loops() {
        // 20 claims its successor has id 30 but points back at 10, leaving no gap for 5
        let (channel, result) = resolve_with(
            &[
                "INFO|10|20|127.0.0.1:5001|self|127.0.0.1:5001",
                "INFO|20|30|127.0.0.1:5000|self|127.0.0.1:5000",
            ],
            5,
        )
        .await;

        assert!(matches!(result, Err(RingJoinError::ProtocolViolation(msg)) if msg.contains("walking 2 members")));
        assert_eq!(channel.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_walk_is_not_bounded_by_identifier_count() {
        // 60 members, joiner's gap is behind the last one
        let mut replies = Vec::new();
        for n in 0..60u16 {
            let next = if n == 59 { 0 } else { n + 1 };
            let succ_id = if n == 59 { 0 } else { (n as u32 + 1) * 2 };
            replies.push(format!(
                "INFO|{}|{}|127.0.0.1:{}|self|self",
                n as u32 * 2,
                succ_id,
                5000 + next
            ));
        }
        replies.push("PRED".to_string());
        replies.push("SUCC|119|127.0.0.1:5000".to_string());
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();

        let (_, result) = resolve_with(&replies, 119).await;
        let state = result.unwrap();
        assert_eq!(state.position.predecessor, addr(5059));
        assert_eq!(state.position.successor, addr(5000));
    }

    #[tokio::test]
    async fn test_late_info_is_not_an_echo() {
        // a duplicate INFO arriving where the PRED echo is expected
        let (_, result) = resolve_with(
            &["INFO|10|10|self|self|self", "INFO|10|10|self|self|self"],
            15,
        )
        .await;
        assert!(matches!(result, Err(RingJoinError::ProtocolViolation(msg)) if msg.contains("answered PRED")));
    }
}
