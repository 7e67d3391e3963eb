//! Membership directory kept by the rendezvous.
//!
//! Maps each peer address to the identifier it was given and whether the peer
//! has confirmed it. Identifiers come from a fixed pool of `K` values and are
//! never returned to it, so `available() + len() == K` always holds.
use std::collections::HashMap;
use std::net::SocketAddr;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::identifier::Identifier;
use super::messages::Placement;
use crate::error::{RingJoinError, Result};
use crate::protocol_violation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    /// Identifier sent, acknowledgment not yet seen
    Pending,
    /// Peer acknowledged its identifier
    Confirmed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub identifier: Identifier,
    pub address: SocketAddr,
    pub state: PeerState,
}

impl PeerRecord {
    pub fn is_confirmed(&self) -> bool {
        self.state == PeerState::Confirmed
    }
}

/// Reply material for a `hello`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub identifier: Identifier,
    pub placement: Placement,
}

pub struct MembershipDirectory<R: Rng = StdRng> {
    capacity: u32,
    // registration order; index 0 is the root
    records: IndexMap<SocketAddr, PeerRecord>,
    by_identifier: HashMap<Identifier, SocketAddr>,
    pool: Vec<Identifier>,
    rng: R,
}

impl std::fmt::Debug for MembershipDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipDirectory")
            .field("capacity", &self.capacity)
            .field("records", &self.records.len())
            .field("available", &self.pool.len())
            .finish()
    }
}

impl MembershipDirectory<StdRng> {
    /// Directory with an OS-seeded RNG.
    pub fn new(capacity: u32) -> Self {
        Self::with_rng(capacity, StdRng::from_os_rng())
    }

    /// Directory whose allocations are reproducible for a given seed.
    pub fn seeded(capacity: u32, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MembershipDirectory<R> {
    pub fn with_rng(capacity: u32, rng: R) -> Self {
        Self {
            capacity,
            records: IndexMap::new(),
            by_identifier: HashMap::new(),
            pool: (0..capacity).map(Identifier::new).collect(),
            rng,
        }
    }

    /// Handle a `hello` from `address`.
    ///
    /// A known address gets its existing identifier back, so retried hellos
    /// never allocate twice.
    pub fn on_hello(&mut self, address: SocketAddr) -> Result<Assignment> {
        let identifier = match self.records.get(&address) {
            Some(record) => {
                debug!(
                    "hello from an already registered peer {}, resending id {}",
                    address, record.identifier
                );
                record.identifier
            }
            None => {
                if self.pool.is_empty() {
                    warn!("hello from {} but the identifier pool is empty", address);
                    return Err(RingJoinError::PoolExhausted {
                        capacity: self.capacity,
                    });
                }
                let index = self.rng.random_range(0..self.pool.len());
                let identifier = self.pool.swap_remove(index);
                self.records.insert(
                    address,
                    PeerRecord {
                        identifier,
                        address,
                        state: PeerState::Pending,
                    },
                );
                self.by_identifier.insert(identifier, address);
                info!("hello from a new peer {}, assigned id {}", address, identifier);
                identifier
            }
        };

        Ok(Assignment {
            identifier,
            placement: self.placement_for(address),
        })
    }

    /// Handle an `ACK|<identifier>` from `address`.
    pub fn on_ack(&mut self, address: SocketAddr, identifier: Identifier) -> Result<&PeerRecord> {
        let owner = *self.by_identifier.get(&identifier).ok_or_else(|| {
            protocol_violation!(
                "{} acknowledged id {} which was never issued",
                address,
                identifier
            )
        })?;
        if owner != address {
            warn!(
                "id {} acknowledged by {} but was issued to {}",
                identifier, address, owner
            );
        }

        let record = self
            .records
            .get_mut(&owner)
            .ok_or_else(|| protocol_violation!("No record for id {}", identifier))?;
        if record.state == PeerState::Pending {
            record.state = PeerState::Confirmed;
            info!("peer {} confirmed id {}", owner, identifier);
        }
        Ok(record)
    }

    fn placement_for(&self, address: SocketAddr) -> Placement {
        match self.records.get_index(0) {
            Some((root, _)) if *root == address => Placement::Root,
            Some((root, _)) => Placement::Join(*root),
            None => Placement::Unplaced,
        }
    }

    /// Address of the first peer ever registered
    pub fn root(&self) -> Option<SocketAddr> {
        self.records.get_index(0).map(|(addr, _)| *addr)
    }

    pub fn get(&self, address: &SocketAddr) -> Option<&PeerRecord> {
        self.records.get(address)
    }

    pub fn get_by_identifier(&self, identifier: Identifier) -> Option<&PeerRecord> {
        self.by_identifier
            .get(&identifier)
            .and_then(|addr| self.records.get(addr))
    }

    /// Records in registration order
    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn confirmed(&self) -> usize {
        self.records.values().filter(|r| r.is_confirmed()).count()
    }

    /// Identifiers still in the pool
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_first_hello_is_root() {
        let mut directory = MembershipDirectory::seeded(50, 7);

        let first = directory.on_hello(peer(5000)).unwrap();
        assert_eq!(first.placement, Placement::Root);
        assert!(first.identifier.value() < 50);

        let second = directory.on_hello(peer(5001)).unwrap();
        assert_eq!(second.placement, Placement::Join(peer(5000)));
        assert_ne!(first.identifier, second.identifier);
        assert_eq!(directory.root(), Some(peer(5000)));
    }

    #[test]
    fn test_repeated_hello_keeps_identifier() {
        let mut directory = MembershipDirectory::seeded(50, 1);

        let first = directory.on_hello(peer(5000)).unwrap();
        let again = directory.on_hello(peer(5000)).unwrap();
        assert_eq!(first, again);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.available(), 49);

        // the root keeps its placement even after others joined
        directory.on_hello(peer(5001)).unwrap();
        assert_eq!(
            directory.on_hello(peer(5000)).unwrap().placement,
            Placement::Root
        );
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut directory = MembershipDirectory::seeded(3, 99);
        for port in 0..3 {
            directory.on_hello(peer(6000 + port)).unwrap();
        }
        assert_eq!(directory.available(), 0);

        let result = directory.on_hello(peer(7000));
        assert!(matches!(
            result,
            Err(RingJoinError::PoolExhausted { capacity: 3 })
        ));
        assert_eq!(directory.len(), 3);

        // known peers are still answered
        assert!(directory.on_hello(peer(6001)).is_ok());
    }

    #[test]
    fn test_ack_confirms_record() {
        let mut directory = MembershipDirectory::seeded(50, 3);
        let assignment = directory.on_hello(peer(5000)).unwrap();
        assert_eq!(
            directory.get(&peer(5000)).unwrap().state,
            PeerState::Pending
        );

        let record = directory.on_ack(peer(5000), assignment.identifier).unwrap();
        assert!(record.is_confirmed());
        assert_eq!(directory.confirmed(), 1);

        // duplicate acknowledgments are harmless
        directory.on_ack(peer(5000), assignment.identifier).unwrap();
        assert_eq!(directory.confirmed(), 1);
    }

    #[test]
    fn test_ack_for_unknown_identifier() {
        let mut directory = MembershipDirectory::seeded(50, 3);
        let assignment = directory.on_hello(peer(5000)).unwrap();
        let unknown = Identifier::new((assignment.identifier.value() + 1) % 50);

        let result = directory.on_ack(peer(5000), unknown);
        assert!(matches!(result, Err(RingJoinError::ProtocolViolation(_))));
        assert_eq!(directory.confirmed(), 0);
    }

    #[test]
    fn test_seeded_allocation_is_reproducible() {
        let mut a = MembershipDirectory::seeded(50, 42);
        let mut b = MembershipDirectory::seeded(50, 42);
        for port in 0..10 {
            assert_eq!(
                a.on_hello(peer(port)).unwrap(),
                b.on_hello(peer(port)).unwrap()
            );
        }
    }

    #[test]
    fn test_lookup_by_identifier() {
        let mut directory = MembershipDirectory::seeded(50, 5);
        let assignment = directory.on_hello(peer(5000)).unwrap();
        let record = directory.get_by_identifier(assignment.identifier).unwrap();
        assert_eq!(record.address, peer(5000));
        let order: Vec<_> = directory.records().map(|r| r.address).collect();
        assert_eq!(order, vec![peer(5000)]);
    }

    proptest! {
        #[test]
        fn test_identifiers_unique_and_pool_conserved(
            capacity in 1u32..64,
            seed in any::<u64>(),
            hellos in proptest::collection::vec(0u16..96, 1..160),
        ) {
            let mut directory = MembershipDirectory::seeded(capacity, seed);
            let mut roots = 0;
            for port in hellos {
                match directory.on_hello(peer(port)) {
                    Ok(assignment) => {
                        prop_assert!(assignment.identifier.value() < capacity);
                        if assignment.placement == Placement::Root {
                            prop_assert_eq!(Some(peer(port)), directory.root());
                            roots += 1;
                        }
                    }
                    Err(RingJoinError::PoolExhausted { .. }) => {
                        prop_assert_eq!(directory.available(), 0);
                    }
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
                prop_assert_eq!(directory.available() + directory.len(), capacity as usize);
            }

            let ids: HashSet<_> = directory.records().map(|r| r.identifier).collect();
            prop_assert_eq!(ids.len(), directory.len());
            prop_assert!(roots >= 1);
        }
    }
}
