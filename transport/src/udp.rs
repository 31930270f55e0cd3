use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use udht_logic::transport::{Request, RequestHandler, Response, TransportError, TransportSender};
use udht_logic::{Contact, Id};

use crate::proto::{Body, Packet, PeerInfo};

/// Largest datagram we are willing to parse.
const MAX_DATAGRAM: usize = 64 * 1024;

struct UdpEndpoint {
    socket: UdpSocket,
    local: PeerInfo,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
}

/// Datagram transport over one shared UDP socket.
///
/// Replies are matched to requests by id; unmatched or undecodable
/// datagrams are dropped with a log line and never touch routing
/// state.
#[derive(Clone)]
pub struct UdpTransport(Arc<UdpEndpoint>);

impl UdpTransport {
    /// Binds a socket and derives the node identity from the bound
    /// endpoint (port 0 picks a free port first).
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let id = Id::from_endpoint(local_addr.ip(), local_addr.port());
        Ok(UdpTransport(Arc::new(UdpEndpoint {
            socket,
            local: PeerInfo::from(Contact::new(id, local_addr)),
            next_request_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        })))
    }

    pub fn id(&self) -> Id {
        self.0.local.id
    }

    pub fn local_contact(&self) -> Contact {
        self.0.local.contact()
    }

    /// Runs the receive loop: decode, ingress-update, then either
    /// dispatch a request or complete a pending wait.
    pub fn spawn_listener<H>(&self, handler: H) -> JoinHandle<()>
    where
        H: RequestHandler + Send + Sync + 'static,
    {
        let ep = Arc::clone(&self.0);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match ep.socket.recv_from(&mut buf).await {
                    Ok(x) => x,
                    Err(err) => {
                        warn!("udp receive failed: {err}");
                        continue;
                    }
                };
                let packet = match Packet::decode(&buf[..len]) {
                    Ok(x) => x,
                    Err(err) => {
                        warn!("dropping undecodable datagram from {from}: {err}");
                        continue;
                    }
                };

                let sender = packet.sender.contact();

                match packet.body {
                    Body::Request(request) => {
                        handler.observe_sender(sender);
                        let response = match handler.on_request(sender, request) {
                            Ok(x) => x,
                            Err(err) => {
                                debug!("request from {from} ignored: {err}");
                                continue;
                            }
                        };
                        let reply = Packet {
                            request_id: packet.request_id,
                            sender: ep.local.clone(),
                            body: Body::Response(response),
                        };
                        match reply.encode() {
                            Ok(bytes) => {
                                if let Err(err) = ep.socket.send_to(&bytes, from).await {
                                    warn!("reply to {from} failed: {err}");
                                }
                            }
                            Err(err) => warn!("encoding reply for {from} failed: {err}"),
                        }
                    }
                    Body::Response(response) => {
                        let waiter = ep.pending.lock().unwrap().remove(&packet.request_id);
                        match waiter {
                            // A closed receiver means the caller moved
                            // on; the late reply is discarded.
                            Some(tx) => {
                                handler.observe_sender(sender);
                                let _ = tx.send(response);
                            }
                            // Late or unsolicited: dropped without
                            // touching routing state
                            None => {
                                debug!("unmatched reply {} from {from}", packet.request_id)
                            }
                        }
                    }
                }
            }
        })
    }
}

impl TransportSender for UdpTransport {
    type Fut = BoxFuture<'static, Result<Response, TransportError>>;

    fn send_and_wait(&self, to: SocketAddr, msg: Request, timeout: Duration) -> Self::Fut {
        let ep = Arc::clone(&self.0);
        async move {
            let request_id = ep.next_request_id.fetch_add(1, Ordering::Relaxed);
            let packet = Packet {
                request_id,
                sender: ep.local.clone(),
                body: Body::Request(msg),
            };
            let bytes = packet
                .encode()
                .map_err(|err| TransportError::Codec(err.to_string().into()))?;

            let (tx, rx) = oneshot::channel();
            ep.pending.lock().unwrap().insert(request_id, tx);

            if let Err(err) = ep.socket.send_to(&bytes, to).await {
                ep.pending.lock().unwrap().remove(&request_id);
                return Err(TransportError::Network(err.to_string().into()));
            }

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(TransportError::Network("receive loop is gone".into())),
                Err(_) => {
                    ep.pending.lock().unwrap().remove(&request_id);
                    Err(TransportError::Timeout)
                }
            }
        }
        .boxed()
    }
}
