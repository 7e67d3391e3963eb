pub mod directory;
pub mod identifier;
pub mod messages;
pub mod peer;
pub mod rendezvous;
pub mod ring;

pub use directory::{Assignment, MembershipDirectory, PeerRecord, PeerState};
pub use identifier::Identifier;
pub use messages::{Endpoint, Message, Placement};
pub use peer::{Membership, PeerNode};
pub use rendezvous::{RendezvousNode, RendezvousService};
pub use ring::{RingPosition, RingResolver, RingState};
