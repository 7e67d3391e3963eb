use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ringjoin::cli;
use ringjoin::node::{PeerNode, RendezvousNode};
use ringjoin::settings::{self, PeerSettings, RendezvousSettings};
use ringjoin::transport::UdpChannel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars; usage errors exit with status 2
    let args = cli::Cli::parse();
    let settings = match args.into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ringjoin=debug".into());
    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        "Starting {} {} as {}",
        settings::APP_NAME,
        settings::APP_VERSION,
        settings.role
    );
    match settings.role {
        settings::Role::Rendezvous(rendezvous) => run_rendezvous(rendezvous).await,
        settings::Role::Peer(peer) => run_peer(peer).await,
    }
}

async fn run_rendezvous(settings: RendezvousSettings) -> anyhow::Result<()> {
    let node = RendezvousNode::bind(&settings).await?;
    tokio::select! {
        result = node.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down rendezvous"),
    }
    Ok(())
}

async fn run_peer(settings: PeerSettings) -> anyhow::Result<()> {
    let rendezvous = settings.rendezvous_addr().await?;
    let channel = Arc::new(UdpChannel::bind_for(rendezvous).await?);
    let inbound = channel
        .take_inbound()
        .await
        .ok_or_else(|| anyhow::anyhow!("Inbound queue already taken"))?;

    let peer = PeerNode::new(channel, rendezvous, settings.retry);
    let membership = peer.join().await?;
    let position = membership.ring.position;
    info!(
        "Joined as ID {}{}: successor {}, successor's successor {}, predecessor {}",
        membership.identifier(),
        if membership.is_root { " (root)" } else { "" },
        position.successor,
        position.successor_of_successor,
        position.predecessor
    );

    tokio::select! {
        result = peer.serve(membership.ring, inbound) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down peer"),
    }

    let stats = peer.channel().receiver().get_stats();
    info!(
        "Sent {} datagrams, received {} ({} replies, {} receive errors)",
        peer.channel().messages_sent(),
        stats.messages_received.load(Ordering::Relaxed),
        stats.responses_routed.load(Ordering::Relaxed),
        stats.receive_errors.load(Ordering::Relaxed)
    );
    Ok(())
}
