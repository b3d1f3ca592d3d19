use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A verified caller identity. The MPC never parses auth tokens — by
/// the time a `UserId` reaches this crate it has already been
/// authenticated by the (out-of-scope) identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartnershipId(pub Uuid);

impl fmt::Display for PartnershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PartnershipId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Orders an unordered user pair so that `userA < userB`, matching the
/// partnership invariant in §3.
pub fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
