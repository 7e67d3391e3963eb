use std::str::FromStr;

/// Membership identifier handed out by the rendezvous, in `[0, K)`
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Identifier(u32);

impl Identifier {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether `self` lies strictly after `from` and strictly before `to`
    /// going around the ring.
    ///
    /// When `from == to` the ring has a single member and every other
    /// identifier lies between.
    pub fn is_between(&self, from: Identifier, to: Identifier) -> bool {
        if from < to {
            from < *self && *self < to
        } else {
            *self > from || *self < to
        }
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Self {
        Identifier::new(id)
    }
}

impl FromStr for Identifier {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Identifier)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
