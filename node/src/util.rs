use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use tokio::net::TcpStream;
use tokio::time::timeout;

use tclib::chain::ACTIVE_CHAIN_IDX;
use tclib::error::PeerIoError;
use tclib::mining::{self, MINE_INTERRUPT};
use tclib::network::{self, GetBlocksMsg, Message};
use tclib::types::Block;
use tclib::wallet::Wallet;

use crate::{config, CHAIN, PEERS};

const SEND_ATTEMPTS: u32 = 3;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Deliver one message to one peer over a fresh connection. With no peer
/// given, one is chosen at random. A peer that stays unreachable through
/// the retry budget is evicted.
pub async fn send_to_peer(message: Message, peer: Option<String>) -> bool {
    let peer = match peer.or_else(random_peer) {
        Some(peer) => peer,
        None => {
            debug!("no peers to send to");
            return false;
        }
    };

    for attempt in 1..=SEND_ATTEMPTS {
        match timeout(SEND_TIMEOUT, send_once(&peer, &message)).await {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => warn!("error sending to {peer} (attempt {attempt}): {err}"),
            Err(_) => warn!("timed out sending to {peer} (attempt {attempt})"),
        }
    }
    warn!("peer {peer} unreachable, evicting");
    PEERS.remove(&peer);
    false
}

fn random_peer() -> Option<String> {
    let peers: Vec<String> = PEERS.iter().map(|peer| peer.key().clone()).collect();
    peers.choose(&mut rand::thread_rng()).cloned()
}

async fn send_once(peer: &str, message: &Message) -> Result<(), PeerIoError> {
    let addr = if peer.contains(':') {
        peer.to_string()
    } else {
        format!("{peer}:{}", config().port)
    };
    let mut stream = TcpStream::connect(addr).await?;
    network::send_message(&mut stream, message).await
}

/// Relay a message to every known peer.
pub async fn broadcast(message: &Message) {
    let peers: Vec<String> = PEERS.iter().map(|peer| peer.key().clone()).collect();
    for peer in peers {
        send_to_peer(message.clone(), Some(peer)).await;
    }
}

/// Connect a block under the chain lock and, when any chain accepted it,
/// relay it to the network.
pub async fn accept_block(block: Block) -> Option<usize> {
    let chain_idx = CHAIN.write().await.connect_block(block.clone(), false);
    if chain_idx.is_some() {
        broadcast(&Message::Block(block)).await;
    }
    chain_idx
}

/// Kick off sync by asking a random peer for whatever follows our tip.
pub async fn initial_block_download() {
    if PEERS.is_empty() {
        return;
    }
    let from_blockid = CHAIN.read().await.tip().id();
    info!("starting initial block download from {from_blockid}");
    send_to_peer(Message::GetBlocks(GetBlocksMsg { from_blockid }), None).await;
}

/// The mining loop: assemble on the current tip, hand the nonce search to
/// a blocking worker, connect and persist whatever it finds. A chain
/// mutation mid-search interrupts the worker and the loop starts over on
/// the new tip.
pub async fn mine_forever() -> Result<()> {
    loop {
        let wallet = Wallet::load_or_init(&config().wallet_path)?;
        let assembled = {
            let chain = CHAIN.read().await;
            mining::assemble_block(&chain, &wallet.address, None)
        };
        let block = match assembled {
            Ok(block) => block,
            Err(err) => {
                warn!("could not assemble a block: {err}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        info!(
            "mining on {} with {} txn(s) at bits {}",
            block.prev_block_hash,
            block.txns.len(),
            block.bits
        );
        MINE_INTERRUPT.clear();
        let mined = tokio::task::spawn_blocking(move || mining::mine(&block, &MINE_INTERRUPT)).await?;
        let Some(mined) = mined else {
            continue;
        };

        if accept_block(mined).await == Some(ACTIVE_CHAIN_IDX) {
            let chain = CHAIN.read().await;
            if let Err(err) = chain.save_to_disk(&config().chain_path) {
                warn!("failed to persist chain: {err}");
            }
        }
    }
}
