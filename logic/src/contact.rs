use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use crate::id::Id;

/// A peer endpoint: identity plus the address it speaks from.
///
/// Contacts are plain values; equality and hashing go by id only.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Contact {
    pub id: Id,
    pub addr: SocketAddr,
}

impl Contact {
    pub fn new(id: Id, addr: SocketAddr) -> Self {
        Contact { id, addr }
    }

    /// A contact whose id is derived from its own endpoint.
    pub fn from_endpoint(addr: SocketAddr) -> Self {
        Contact {
            id: Id::from_endpoint(addr.ip(), addr.port()),
            addr,
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Contact")
            .field(&self.id.as_short_hex())
            .field(&self.addr)
            .finish()
    }
}
