use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use dashmap::DashSet;
use log::{error, info, warn};
use static_init::dynamic;
use tokio::net::TcpListener;
use tokio::sync::{Notify, RwLock};
use tokio::time::sleep;

use tclib::chain::ChainState;

mod handler;
mod util;

#[dynamic]
pub static CHAIN: RwLock<ChainState> = RwLock::new(ChainState::new());

#[dynamic]
pub static PEERS: DashSet<String> = DashSet::new();

#[dynamic]
pub static IBD_DONE: Notify = Notify::new();

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub struct Config {
    pub port: u16,
    pub chain_path: PathBuf,
    pub wallet_path: PathBuf,
}

pub fn config() -> &'static Config {
    CONFIG.get().expect("config is set before the node starts")
}

fn default_port() -> u16 {
    env::var("TC_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9999)
}

fn default_chain_path() -> String {
    env::var("TC_CHAIN_PATH").unwrap_or_else(|_| "chain.dat".to_string())
}

fn default_wallet_path() -> String {
    env::var("TC_WALLET_PATH").unwrap_or_else(|_| "wallet.dat".to_string())
}

#[derive(FromArgs)]
/// A tinychain full node
struct Args {
    /// port number to listen on
    #[argh(option, default = "default_port()")]
    port: u16,

    /// chain file path
    #[argh(option, default = "default_chain_path()")]
    chain_path: String,

    /// wallet file path
    #[argh(option, default = "default_wallet_path()")]
    wallet_path: String,

    /// hostnames of initial peers
    #[argh(positional)]
    peers: Vec<String>,
}

fn init_logging() {
    let filter = env::var("TC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let label = env::var("TC_LOG_LABEL").unwrap_or_default();
    env_logger::Builder::new()
        .parse_filters(&filter)
        .format(move |buf, record| {
            if label.is_empty() {
                writeln!(buf, "[{:<5} {}] {}", record.level(), record.target(), record.args())
            } else {
                writeln!(
                    buf,
                    "[{label}] [{:<5} {}] {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            }
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args: Args = argh::from_env();

    CONFIG
        .set(Config {
            port: args.port,
            chain_path: PathBuf::from(&args.chain_path),
            wallet_path: PathBuf::from(&args.wallet_path),
        })
        .ok();

    {
        let mut chain = CHAIN.write().await;
        chain.load_from_disk(&config().chain_path);
        info!("chain initialized at height {}", chain.current_height());
    }

    let mut peers = args.peers;
    if peers.is_empty() {
        if let Ok(from_env) = env::var("TC_PEERS") {
            peers = from_env
                .split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    for peer in peers {
        info!("adding peer {peer}");
        PEERS.insert(peer);
    }

    tokio::spawn(serve(config().port));

    if PEERS.is_empty() {
        info!("no peers known, starting as a seed node");
    } else {
        util::initial_block_download().await;
        tokio::select! {
            _ = IBD_DONE.notified() => info!("synced with the network"),
            _ = sleep(Duration::from_secs(60)) => {
                warn!("mining despite unfinished initial block download");
            }
        }
    }

    util::mine_forever().await
}

async fn serve(port: u16) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("could not bind port {port}: {err}");
            return;
        }
    };
    info!("listening on port {port}");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(async move {
                    if let Err(err) = handler::handle_connection(stream).await {
                        warn!("connection from {addr} failed: {err}");
                    }
                });
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
}
