#![forbid(unsafe_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use udht_logic::config::SystemConfig;
use udht_logic::KademliaNode;

pub mod proto;
pub mod udp;

pub use udp::UdpTransport;

/// Binds a UDP socket, builds a node identified by the bound endpoint
/// and starts its receive loop.
pub async fn create_node(
    bind: SocketAddr,
    config: SystemConfig,
) -> io::Result<(Arc<KademliaNode<UdpTransport>>, JoinHandle<()>)> {
    let transport = UdpTransport::bind(bind).await?;
    let node = KademliaNode::new(config, transport.id(), transport.clone());
    let listener = transport.spawn_listener(Arc::clone(&node));
    info!(
        "node {} listening on {}",
        node.id(),
        transport.local_contact().addr
    );
    Ok((node, listener))
}
