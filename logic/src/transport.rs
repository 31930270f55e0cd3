use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contact::Contact;
use crate::id::Id;
use crate::storage::StorageError;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Request {
    Ping,
    FindNode(Id),
    FindValue(Vec<u8>),
    // key, value
    Store(Vec<u8>, Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    Pong,
    Nodes(Vec<Contact>),
    Value(Vec<u8>),
    Stored,
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The peer did not answer within the deadline.
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(Cow<'static, str>),

    #[error("undecodable reply: {0}")]
    Codec(Cow<'static, str>),
}

impl From<&'static str> for TransportError {
    fn from(x: &'static str) -> Self {
        TransportError::Network(Cow::Borrowed(x))
    }
}

impl From<String> for TransportError {
    fn from(x: String) -> Self {
        TransportError::Network(Cow::Owned(x))
    }
}

/// Object able to send a request to a peer endpoint and await the
/// matched reply.
///
/// The datagram layer underneath is unreliable and unordered; the only
/// delivery guarantee is that a returned `Response` answers the given
/// `Request`. Expiry of `timeout` surfaces as [`TransportError::Timeout`].
// Should use some sort of interior mutability and refcounting:
// a Transport copy must be cheap and sendable across task boundaries.
pub trait TransportSender: Clone + Send + Sync {
    /// Future returned when sending a message to another peer
    type Fut: Future<Output = Result<Response, TransportError>> + Send;

    fn send_and_wait(&self, to: SocketAddr, msg: Request, timeout: Duration) -> Self::Fut;
}

/// Inbound dispatch: the transport hands every decoded request here.
pub trait RequestHandler {
    /// Ingress contact update. Called with the sender identity of
    /// every decoded packet, request or reply, before it is handled.
    fn observe_sender(&self, sender: Contact);

    /// Handle one request; an `Err` drops the message without a reply.
    fn on_request(&self, sender: Contact, request: Request) -> Result<Response, HandleError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandleError {
    /// Zero-length keys are never served.
    #[error("empty key")]
    EmptyKey,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
