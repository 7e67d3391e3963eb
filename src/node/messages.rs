//! Wire messages
//!
//! Every datagram is ASCII text with fields separated by `|`:
//!
//! | message | sender | meaning |
//! |---------|--------|---------|
//! | `hello` | peer | ask the rendezvous for an identifier |
//! | `ID|<id>|root` | rendezvous | identifier, and the peer is the first ring member |
//! | `ID|<id>|address|<root>` | rendezvous | identifier, and where the root lives |
//! | `ID|<id>` | rendezvous | identifier without placement (legacy) |
//! | `ACK|<id>` | peer, echoed by rendezvous | confirm the identifier |
//! | `QUERY` | peer | ask a ring member for its identifier and links |
//! | `INFO|<id>|<succ id>|<succ>|<succ of succ>|<pred>` | ring member | answer to `QUERY` |
//! | `PRED` | joiner | the sender is now your predecessor |
//! | `SUCC|<id>|<succ of succ>` | joiner | the sender (with `<id>`) is now your successor |
//! | `SUCC2` | joiner | the sender is now your successor's successor |
//!
//! Ring members echo `PRED`, `SUCC` and `SUCC2` back verbatim.
use std::net::SocketAddr;

use super::identifier::Identifier;
use crate::error::Result;
use crate::protocol_violation;

const FIELD_SEPARATOR: char = '|';
const OWNER_TOKEN: &str = "self";

/// Where a newly assigned peer belongs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// First ring member, all links point at itself
    Root,
    /// Resolve the ring position starting from this root address
    Join(SocketAddr),
    /// Assignment without ring information
    Unplaced,
}

/// A ring link as carried on the wire.
///
/// `Owner` stands for the node holding the link: the responder of an `INFO`,
/// the receiver of a `SUCC`. Nodes often cannot name their own public address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Owner,
    At(SocketAddr),
}

impl Endpoint {
    /// Express `addr` as seen by the node at `owner`.
    pub fn relative_to(addr: SocketAddr, owner: SocketAddr) -> Self {
        if addr == owner {
            Endpoint::Owner
        } else {
            Endpoint::At(addr)
        }
    }

    /// Turn the link back into an address, given the owner's address.
    pub fn resolve(&self, owner: SocketAddr) -> SocketAddr {
        match self {
            Endpoint::Owner => owner,
            Endpoint::At(addr) => *addr,
        }
    }

    fn encode(&self) -> String {
        match self {
            Endpoint::Owner => OWNER_TOKEN.to_string(),
            Endpoint::At(addr) => addr.to_string(),
        }
    }

    fn decode(field: &str) -> Result<Self> {
        if field == OWNER_TOKEN {
            Ok(Endpoint::Owner)
        } else {
            Ok(Endpoint::At(field.parse()?))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Request an identifier
    Hello,
    /// Identifier allocated to the sender of a `Hello`
    IdentifierAssignment {
        identifier: Identifier,
        placement: Placement,
    },
    /// Confirmation of an identifier, echoed by the rendezvous
    Acknowledgment { identifier: Identifier },
    /// Ask a ring member who it is and who it links to
    Query,
    /// A ring member's identifier and links
    Info {
        identifier: Identifier,
        successor_identifier: Identifier,
        successor: Endpoint,
        successor_of_successor: Endpoint,
        predecessor: Endpoint,
    },
    /// The sender becomes the receiver's predecessor
    SetPredecessor,
    /// The sender becomes the receiver's successor
    SetSuccessor {
        identifier: Identifier,
        successor_of_successor: Endpoint,
    },
    /// The sender becomes the receiver's successor's successor
    SetSuccessorOfSuccessor,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| protocol_violation!("Datagram is not valid text"))?;
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();

        match fields.as_slice() {
            ["hello"] => Ok(Message::Hello),
            ["ID", id] => Ok(Message::IdentifierAssignment {
                identifier: id.parse()?,
                placement: Placement::Unplaced,
            }),
            ["ID", id, "root"] => Ok(Message::IdentifierAssignment {
                identifier: id.parse()?,
                placement: Placement::Root,
            }),
            ["ID", id, "address", root] => Ok(Message::IdentifierAssignment {
                identifier: id.parse()?,
                placement: Placement::Join(root.parse()?),
            }),
            ["ACK", id] => Ok(Message::Acknowledgment {
                identifier: id.parse()?,
            }),
            ["QUERY"] => Ok(Message::Query),
            ["INFO", id, successor_id, successor, successor_of_successor, predecessor] => {
                Ok(Message::Info {
                    identifier: id.parse()?,
                    successor_identifier: successor_id.parse()?,
                    successor: Endpoint::decode(successor)?,
                    successor_of_successor: Endpoint::decode(successor_of_successor)?,
                    predecessor: Endpoint::decode(predecessor)?,
                })
            }
            ["PRED"] => Ok(Message::SetPredecessor),
            ["SUCC", id, successor_of_successor] => Ok(Message::SetSuccessor {
                identifier: id.parse()?,
                successor_of_successor: Endpoint::decode(successor_of_successor)?,
            }),
            ["SUCC2"] => Ok(Message::SetSuccessorOfSuccessor),
            _ => Err(protocol_violation!("Unrecognized message: {:?}", text)),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Hello => write!(f, "hello"),
            Message::IdentifierAssignment {
                identifier,
                placement,
            } => match placement {
                Placement::Root => write!(f, "ID|{}|root", identifier),
                Placement::Join(root) => write!(f, "ID|{}|address|{}", identifier, root),
                Placement::Unplaced => write!(f, "ID|{}", identifier),
            },
            Message::Acknowledgment { identifier } => write!(f, "ACK|{}", identifier),
            Message::Query => write!(f, "QUERY"),
            Message::Info {
                identifier,
                successor_identifier,
                successor,
                successor_of_successor,
                predecessor,
            } => write!(
                f,
                "INFO|{}|{}|{}|{}|{}",
                identifier,
                successor_identifier,
                successor.encode(),
                successor_of_successor.encode(),
                predecessor.encode()
            ),
            Message::SetPredecessor => write!(f, "PRED"),
            Message::SetSuccessor {
                identifier,
                successor_of_successor,
            } => write!(f, "SUCC|{}|{}", identifier, successor_of_successor.encode()),
            Message::SetSuccessorOfSuccessor => write!(f, "SUCC2"),
        }
    }
}
