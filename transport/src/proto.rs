use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use udht_logic::transport::{Request, Response};
use udht_logic::{Contact, Id};

/// Sender identity stamped on every datagram. Ids travel in their
/// 64-char canonical hex form and are validated on decode.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: Id,
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerInfo {
    pub fn contact(&self) -> Contact {
        Contact::new(self.id, SocketAddr::new(self.ip, self.port))
    }
}

impl From<Contact> for PeerInfo {
    fn from(contact: Contact) -> Self {
        PeerInfo {
            id: contact.id,
            ip: contact.addr.ip(),
            port: contact.addr.port(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Body {
    Request(Request),
    Response(Response),
}

/// One datagram: a request or its matched response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub request_id: u64,
    pub sender: PeerInfo,
    pub body: Body,
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
