use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::contact::Contact;
use crate::heap::BoundedHeap;
use crate::id::Id;
use crate::node::KademliaNode;
use crate::transport::{Request, Response, TransportSender};

/// What an iterative lookup is after.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LookupKind {
    Nodes,
    /// Carries the raw key; the lookup target is its hash.
    Value(Vec<u8>),
}

/// Outcome of an iterative lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupResult {
    /// The closest contacts that survived the search, ascending by
    /// distance to the target.
    ClosestNodes(Vec<Contact>),
    /// Value lookups only: the record was found.
    ValueFound(Vec<u8>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LookupError {
    /// The routing table had nothing to seed the shortlist with.
    #[error("no known peers to start the lookup from")]
    NoSeeds,

    #[error("empty keys are not allowed")]
    EmptyKey,
}

/// Iterative search, after the Kademlia original paper.
///
/// A window of the k closest known contacts is kept in a bounded heap.
/// Each round queries up to alpha of the closest not-yet-contacted
/// entries in parallel and merges whatever they return; when a full
/// round admits nothing new into the window, nobody closer is
/// reachable and the search is done.
pub struct IterativeLookup<'a, T: TransportSender> {
    node: &'a Arc<KademliaNode<T>>,
    kind: LookupKind,
    target: Id,
}

impl<'a, T: TransportSender + Send + Sync + 'static> IterativeLookup<'a, T> {
    pub fn new(node: &'a Arc<KademliaNode<T>>, kind: LookupKind, target: Id) -> Self {
        Self { node, kind, target }
    }

    fn request(&self) -> Request {
        match &self.kind {
            LookupKind::Nodes => Request::FindNode(self.target),
            LookupKind::Value(key) => Request::FindValue(key.clone()),
        }
    }

    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn run(self) -> Result<LookupResult, LookupError> {
        let routing = &self.node.config().routing;
        let (k, alpha, timeout) = (routing.bucket_size, routing.alpha, routing.request_timeout);

        let mut shortlist = BoundedHeap::new(self.target, k);
        for seed in self.node.closest_known(self.target, k) {
            shortlist.push(seed);
        }
        if shortlist.is_empty() {
            return Err(LookupError::NoSeeds);
        }

        loop {
            let batch: Vec<Contact> = shortlist.uncontacted().into_iter().take(alpha).collect();
            if batch.is_empty() {
                // Every window entry was queried; no one knows better
                break;
            }
            for c in &batch {
                shortlist.mark_contacted(&c.id);
            }
            debug!("querying {} candidates", batch.len());

            let mut round: FuturesUnordered<_> = batch
                .iter()
                .map(|c| {
                    let fut = self
                        .node
                        .transport()
                        .send_and_wait(c.addr, self.request(), timeout);
                    let from = *c;
                    async move { (from, fut.await) }
                })
                .collect();

            let mut progress = false;
            while let Some((from, result)) = round.next().await {
                match result {
                    Ok(Response::Nodes(contacts)) => {
                        debug!("{from:?} returned {} contacts", contacts.len());
                        for contact in contacts {
                            if contact.id == self.node.id() {
                                continue;
                            }
                            if shortlist.push(contact) {
                                progress = true;
                            }
                            self.node.observe_contact(contact);
                        }
                    }
                    Ok(Response::Value(value)) => {
                        if let LookupKind::Value(_) = self.kind {
                            // The rest of the round is dropped here;
                            // stragglers die unmatched in the transport.
                            debug!("{from:?} held the value");
                            return Ok(LookupResult::ValueFound(value));
                        }
                        warn!("{from:?} answered a node lookup with a value");
                    }
                    Ok(other) => warn!("{from:?} returned an unexpected reply: {other:?}"),
                    // A silent peer only shrinks the candidate set
                    Err(err) => debug!("{from:?} stayed silent: {err}"),
                }
            }

            if !progress {
                debug!("round admitted no new candidate, lookup converged");
                break;
            }
        }

        Ok(LookupResult::ClosestNodes(shortlist.closest()))
    }
}
