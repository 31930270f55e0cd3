use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::SystemConfig;
use crate::contact::Contact;
use crate::id::Id;
use crate::search::{IterativeLookup, LookupError, LookupKind, LookupResult};
use crate::storage::{Storage, StorageError};
use crate::table::{AddOutcome, RoutingTable};
use crate::transport::{HandleError, Request, RequestHandler, Response, TransportSender};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A running DHT node: identity, routing table, record store and the
/// transport it speaks through.
pub struct KademliaNode<T: TransportSender> {
    // Immutable data
    config: SystemConfig,
    id: Id,
    // Mutable runtime data
    pub transport: T,
    pub table: Mutex<RoutingTable>,
    pub storage: RwLock<Storage>,
}

impl<T: TransportSender + Send + Sync + 'static> KademliaNode<T> {
    pub fn new(config: SystemConfig, id: Id, transport: T) -> Arc<Self> {
        Arc::new(Self {
            id,
            transport,
            table: Mutex::new(RoutingTable::new(id, config.routing.clone())),
            storage: RwLock::new(Storage::new(config.storage.clone())),
            config,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The local view of the `n` contacts closest to `target`.
    pub fn closest_known(&self, target: Id, n: usize) -> Vec<Contact> {
        self.table.lock().unwrap().closest(&target, n)
    }

    /// Ingress learning: every observed (id, address) pair passes
    /// through here. A full, unsplittable bucket gets its oldest
    /// contact probed in the background.
    pub fn observe_contact(self: &Arc<Self>, contact: Contact) {
        let outcome = self.table.lock().unwrap().add_contact(contact);
        if let AddOutcome::ProbeOldest { oldest } = outcome {
            let node = Arc::clone(self);
            tokio::spawn(async move { node.probe_oldest(oldest, contact).await });
        }
    }

    /// Pings the least recently seen contact of a full bucket. If it
    /// stays silent it is evicted and the add of `candidate` retried
    /// once; if it answers it is touched and the candidate stays in
    /// the replacement cache.
    async fn probe_oldest(&self, oldest: Contact, candidate: Contact) {
        let timeout = self.config.routing.request_timeout;
        match self
            .transport
            .send_and_wait(oldest.addr, Request::Ping, timeout)
            .await
        {
            Ok(_) => {
                self.table.lock().unwrap().touch(&oldest.id);
            }
            Err(err) => {
                debug!("evicting silent contact {oldest:?}: {err}");
                let mut table = self.table.lock().unwrap();
                table.remove_contact(&oldest.id);
                table.add_contact(candidate);
            }
        }
    }

    /// The up-to-k closest live contacts to `target`, by iterative
    /// search over the network.
    #[instrument(skip(self), fields(node = %self.id))]
    pub async fn lookup_nodes(self: &Arc<Self>, target: Id) -> Result<Vec<Contact>, LookupError> {
        let lookup = IterativeLookup::new(self, LookupKind::Nodes, target);
        match lookup.run().await? {
            LookupResult::ClosestNodes(nodes) => Ok(nodes),
            LookupResult::ValueFound(_) => unreachable!("node lookups never return values"),
        }
    }

    /// Searches the network for a record, short-circuiting as soon as
    /// any node holds it. Without a hit, the closest nodes to the key
    /// come back instead.
    #[instrument(skip_all, fields(node = %self.id))]
    pub async fn lookup_value(self: &Arc<Self>, key: &[u8]) -> Result<LookupResult, LookupError> {
        if key.is_empty() {
            return Err(LookupError::EmptyKey);
        }
        if let Some(value) = self.storage.read().unwrap().get(key) {
            return Ok(LookupResult::ValueFound(value));
        }
        let lookup = IterativeLookup::new(self, LookupKind::Value(key.to_vec()), Id::for_key(key));
        lookup.run().await
    }

    /// Publishes a record: stored locally, then offered to the closest
    /// nodes found for the key's hash. Returns how many acknowledged.
    #[instrument(skip_all, fields(node = %self.id))]
    pub async fn store_value(
        self: &Arc<Self>,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<usize, StoreError> {
        let target = Id::for_key(&key);
        self.storage
            .write()
            .unwrap()
            .put(key.clone(), value.clone())?;

        let nodes = self.lookup_nodes(target).await?;
        info!(
            "replicating {} value bytes to up to {} nodes",
            value.len(),
            nodes.len()
        );

        let timeout = self.config.routing.store_timeout;
        let request = Request::Store(key, value);
        let mut acks = nodes
            .into_iter()
            .take(self.config.routing.store_replication)
            .map(|to| {
                let fut = self.transport.send_and_wait(to.addr, request.clone(), timeout);
                async move { (to, fut.await) }
            })
            .collect::<FuturesUnordered<_>>();

        let mut count = 0;
        while let Some((to, result)) = acks.next().await {
            match result {
                Ok(Response::Stored) => count += 1,
                Ok(other) => warn!("{to:?} sent an unexpected store reply: {other:?}"),
                Err(err) => warn!("store on {to:?} failed: {err}"),
            }
        }
        Ok(count)
    }

    /// Joins the network through a known peer: a PING teaches both
    /// sides the other's identity, then a self-lookup populates the
    /// nearby buckets.
    #[instrument(skip(self), fields(node = %self.id))]
    pub async fn bootstrap(self: &Arc<Self>, addr: SocketAddr) -> Result<(), LookupError> {
        let timeout = self.config.routing.request_timeout;
        match self
            .transport
            .send_and_wait(addr, Request::Ping, timeout)
            .await
        {
            Ok(Response::Pong) => info!("bootstrap node {addr} answered"),
            Ok(other) => warn!("bootstrap node {addr} sent an unexpected reply: {other:?}"),
            Err(err) => warn!("bootstrap ping to {addr} failed: {err}"),
        }
        self.lookup_nodes(self.id).await?;
        Ok(())
    }

    /// Runs a lookup for a random id inside every bucket that has seen
    /// no traffic for `threshold`.
    pub async fn refresh_lonely_buckets<R: Rng>(
        self: &Arc<Self>,
        threshold: Duration,
        rng: &mut R,
    ) {
        let targets: Vec<Id> = {
            let table = self.table.lock().unwrap();
            table
                .lonely_buckets(threshold)
                .into_iter()
                .map(|index| table.bucket_range(index).random_within(rng))
                .collect()
        };
        debug!("refreshing {} lonely buckets", targets.len());
        for target in targets {
            if let Err(err) = self.lookup_nodes(target).await {
                debug!("bucket refresh lookup failed: {err}");
            }
        }
    }

    fn handle_request(&self, sender: &Contact, request: Request) -> Result<Response, HandleError> {
        match request {
            Request::Ping => Ok(Response::Pong),
            Request::FindNode(target) => Ok(Response::Nodes(self.closer_nodes(&target, sender))),
            Request::FindValue(key) => {
                if key.is_empty() {
                    return Err(HandleError::EmptyKey);
                }
                match self.storage.read().unwrap().get(&key) {
                    Some(value) => Ok(Response::Value(value)),
                    None => Ok(Response::Nodes(self.closer_nodes(&Id::for_key(&key), sender))),
                }
            }
            Request::Store(key, value) => {
                self.storage.write().unwrap().put(key, value)?;
                Ok(Response::Stored)
            }
        }
    }

    fn closer_nodes(&self, target: &Id, asker: &Contact) -> Vec<Contact> {
        let k = self.config.routing.bucket_size;
        self.table
            .lock()
            .unwrap()
            .closest(target, k)
            .into_iter()
            .filter(|c| c.id != asker.id)
            .collect()
    }
}

impl<T: TransportSender + Send + Sync + 'static> RequestHandler for Arc<KademliaNode<T>> {
    fn observe_sender(&self, sender: Contact) {
        self.observe_contact(sender);
    }

    fn on_request(&self, sender: Contact, request: Request) -> Result<Response, HandleError> {
        debug!("request from {sender:?}: {request:?}");
        self.handle_request(&sender, request)
    }
}
