use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use udht_logic::config::SystemConfig;
use udht_transport::create_node;

/// A Kademlia DHT node speaking JSON over UDP.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind the UDP socket on
    #[clap(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// UDP port (0 picks a free one)
    #[clap(short, long, default_value_t = 8090)]
    port: u16,

    /// Peer to join the network through, as ip:port
    #[clap(short, long)]
    bootstrap: Option<SocketAddr>,

    /// Seconds between lonely-bucket refresh sweeps
    #[clap(long, default_value_t = 3600)]
    refresh_interval: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.bind, args.port);

    let (node, listener) = match create_node(addr, SystemConfig::default()).await {
        Ok(x) => x,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    if let Some(peer) = args.bootstrap {
        if let Err(err) = node.bootstrap(peer).await {
            warn!("bootstrap via {peer} failed: {err}");
        } else {
            info!(
                "joined the network, {} contacts known",
                node.table.lock().unwrap().len()
            );
        }
    }

    let refresh = Duration::from_secs(args.refresh_interval);
    let mut rng = StdRng::from_entropy();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(refresh) => {
                node.refresh_lonely_buckets(refresh, &mut rng).await;
            }
        }
    }

    info!("shutting down");
    listener.abort();
}
