//! CLI for this application
//!
use std::net::IpAddr;

use crate::error::Result;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[command(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    // Well-known UDP port of the rendezvous
    #[clap(
        long,
        global = true,
        default_value = settings::DEFAULT_PORT,
        env("RINGJOIN_PORT"),
        help = "UDP port the rendezvous listens on"
    )]
    pub port: u16,

    // Identifier pool size (K)
    #[clap(
        long,
        global = true,
        default_value = settings::DEFAULT_POOL_SIZE,
        env("RINGJOIN_POOL_SIZE"),
        help = "Number of identifiers the rendezvous can allocate"
    )]
    pub pool_size: u32,

    #[clap(
        long,
        global = true,
        default_value = settings::DEFAULT_INITIAL_WAIT_MS,
        env("RINGJOIN_INITIAL_WAIT_MS"),
        help = "First wait for a reply before resending, in milliseconds"
    )]
    pub initial_wait_ms: u64,

    #[clap(
        long,
        global = true,
        default_value = settings::DEFAULT_MAX_WAIT_MS,
        env("RINGJOIN_MAX_WAIT_MS"),
        help = "Give up once the doubled wait exceeds this, in milliseconds"
    )]
    pub max_wait_ms: u64,

    #[clap(
        long,
        global = true,
        env("RINGJOIN_STRICT_ACKS"),
        help = "Stop the rendezvous on an acknowledgment for an unknown identifier"
    )]
    pub strict_acks: bool,

    #[clap(
        long,
        global = true,
        env("RINGJOIN_SEED"),
        help = "Seed for identifier allocation (random when omitted)"
    )]
    pub seed: Option<u64>,

    #[clap(long, global = true, env("RINGJOIN_LOG_JSON"), help = "Log as JSON lines")]
    pub log_json: bool,
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Run the membership directory
    Rendezvous {
        /// Interface to bind to
        #[arg(default_value = settings::DEFAULT_INTERFACE)]
        interface: IpAddr,
    },
    /// Join the ring through the rendezvous at <host>
    Peer {
        /// Host running the rendezvous
        host: String,
    },
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let role = match self.command {
            Command::Rendezvous { interface } => {
                let mut rendezvous =
                    settings::RendezvousSettings::new(interface, self.port, self.pool_size)?;
                rendezvous.strict_acks = self.strict_acks;
                rendezvous.seed = self.seed;
                settings::Role::Rendezvous(rendezvous)
            }
            Command::Peer { host } => settings::Role::Peer(settings::PeerSettings {
                rendezvous_host: host,
                port: self.port,
                retry: settings::retry_policy(self.initial_wait_ms, self.max_wait_ms)?,
            }),
        };
        Ok(settings::Settings {
            role,
            log_json: self.log_json,
        })
    }
}
