use log::info;
use tokio::net::TcpStream;

use tclib::chain::find_in_chain;
use tclib::codec;
use tclib::network::{
    self, GetBlocksMsg, InvMsg, Message, CHUNK_SIZE,
};
use tclib::types::{Block, OutPoint, UnspentTxOut};
use tclib::Hash;

use crate::{util, CHAIN, IBD_DONE, PEERS};

/// One inbound connection carries one framed message; query messages are
/// answered inline on the same stream, block relay flows through fresh
/// connections.
pub async fn handle_connection(mut stream: TcpStream) -> Result<(), tclib::error::PeerIoError> {
    let peer_ip = stream.peer_addr().map(|addr| addr.ip().to_string())?;
    let message = network::receive_message(&mut stream).await?;

    match message {
        Message::GetBlocks(msg) => handle_get_blocks(msg, peer_ip).await,
        Message::Inv(msg) => handle_inv(msg, peer_ip).await,
        Message::GetUtxos(_) => {
            let payload = {
                let chain = CHAIN.read().await;
                let utxos: Vec<(OutPoint, UnspentTxOut)> = chain
                    .utxo_set
                    .iter()
                    .map(|(outpoint, utxo)| (outpoint.clone(), utxo.clone()))
                    .collect();
                codec::serialize(&utxos)
            };
            network::write_frame(&mut stream, payload.as_bytes()).await
        }
        Message::GetMempool(_) => {
            let payload = {
                let chain = CHAIN.read().await;
                codec::serialize(&chain.mempool.txids())
            };
            network::write_frame(&mut stream, payload.as_bytes()).await
        }
        Message::GetActiveChain(_) => {
            let payload = {
                let chain = CHAIN.read().await;
                codec::serialize(&chain.active_chain)
            };
            network::write_frame(&mut stream, payload.as_bytes()).await
        }
        Message::AddPeer(msg) => {
            info!("adding peer {}", msg.peer_hostname);
            PEERS.insert(msg.peer_hostname);
            Ok(())
        }
        Message::Transaction(txn) => {
            info!("received txn {} from {peer_ip}", txn.id());
            CHAIN.write().await.add_txn_to_mempool(txn);
            Ok(())
        }
        Message::Block(block) => {
            info!("received block {} from {peer_ip}", block.id());
            util::accept_block(block).await;
            Ok(())
        }
    }
}

/// Serve the stretch of active chain following the requester's anchor. An
/// unknown anchor restarts them from just past genesis. Whoever syncs from
/// us is worth gossiping to later.
async fn handle_get_blocks(
    msg: GetBlocksMsg,
    peer_ip: String,
) -> Result<(), tclib::error::PeerIoError> {
    PEERS.insert(peer_ip.clone());

    let blocks: Vec<Block> = {
        let chain = CHAIN.read().await;
        let height = find_in_chain(&chain.active_chain, &msg.from_blockid)
            .filter(|height| *height != 0)
            .unwrap_or(1);
        let start = height.min(chain.active_chain.len());
        let end = (height + CHUNK_SIZE).min(chain.active_chain.len());
        chain.active_chain[start..end].to_vec()
    };
    info!("sending {} block(s) to {peer_ip}", blocks.len());
    util::send_to_peer(Message::Inv(InvMsg { blocks }), Some(peer_ip)).await;
    Ok(())
}

/// Connect whatever we have not seen; an inv with nothing new means the
/// download caught up, anything else asks for the next stretch.
async fn handle_inv(msg: InvMsg, peer_ip: String) -> Result<(), tclib::error::PeerIoError> {
    let unknown: Vec<Block> = {
        let chain = CHAIN.read().await;
        msg.blocks
            .into_iter()
            .filter(|block| chain.locate_block(&block.id()).is_none())
            .collect()
    };

    if unknown.is_empty() {
        info!("initial block download complete");
        IBD_DONE.notify_one();
        return Ok(());
    }

    info!("received {} unknown block(s) from {peer_ip}", unknown.len());
    for block in unknown {
        util::accept_block(block).await;
    }

    let new_tip_id: Hash = CHAIN.read().await.tip().id();
    util::send_to_peer(
        Message::GetBlocks(GetBlocksMsg {
            from_blockid: new_tip_id,
        }),
        Some(peer_ip),
    )
    .await;
    Ok(())
}
