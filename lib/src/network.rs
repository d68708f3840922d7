//! The wire protocol: a small set of canonical-codec entities, framed as
//! `u32be length || payload`, one message per TCP connection.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec;
use crate::error::{CodecError, PeerIoError};
use crate::types::{Block, Transaction};
use crate::Hash;

/// How many blocks an `InvMsg` carries per round of initial block download.
pub const CHUNK_SIZE: usize = 50;

/// Upper bound on a single inbound frame; a full 50-block inv of maximal
/// blocks stays well under this.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Ask a peer for the blocks following `from_blockid` on its active chain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct GetBlocksMsg {
    pub from_blockid: Hash,
}

/// A batch of blocks, the response to `GetBlocksMsg`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct InvMsg {
    pub blocks: Vec<Block>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct GetUTXOsMsg {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct GetMempoolMsg {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct GetActiveChainMsg {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct AddPeerMsg {
    pub peer_hostname: String,
}

/// Everything a peer may send us. Decoding dispatches on the payload's
/// `_type` tag against this fixed table; bare transactions and blocks are
/// messages in their own right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    GetBlocks(GetBlocksMsg),
    Inv(InvMsg),
    GetUtxos(GetUTXOsMsg),
    GetMempool(GetMempoolMsg),
    GetActiveChain(GetActiveChainMsg),
    AddPeer(AddPeerMsg),
    Transaction(Transaction),
    Block(Block),
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let serialized = match self {
            Message::GetBlocks(msg) => codec::serialize(msg),
            Message::Inv(msg) => codec::serialize(msg),
            Message::GetUtxos(msg) => codec::serialize(msg),
            Message::GetMempool(msg) => codec::serialize(msg),
            Message::GetActiveChain(msg) => codec::serialize(msg),
            Message::AddPeer(msg) => codec::serialize(msg),
            Message::Transaction(txn) => codec::serialize(txn),
            Message::Block(block) => codec::serialize(block),
        };
        serialized.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let tag = codec::peek_type(bytes)?;
        match tag.as_str() {
            "GetBlocksMsg" => Ok(Message::GetBlocks(codec::deserialize(bytes)?)),
            "InvMsg" => Ok(Message::Inv(codec::deserialize(bytes)?)),
            "GetUTXOsMsg" => Ok(Message::GetUtxos(codec::deserialize(bytes)?)),
            "GetMempoolMsg" => Ok(Message::GetMempool(codec::deserialize(bytes)?)),
            "GetActiveChainMsg" => Ok(Message::GetActiveChain(codec::deserialize(bytes)?)),
            "AddPeerMsg" => Ok(Message::AddPeer(codec::deserialize(bytes)?)),
            "Transaction" => Ok(Message::Transaction(codec::deserialize(bytes)?)),
            "Block" => Ok(Message::Block(codec::deserialize(bytes)?)),
            _ => Err(CodecError::UnknownType(tag)),
        }
    }
}

/// Read one length-prefixed payload off a stream.
pub async fn read_frame<R>(stream: &mut R) -> Result<Vec<u8>, PeerIoError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_BYTES {
        return Err(PeerIoError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed payload to a stream.
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> Result<(), PeerIoError>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read and decode one message.
pub async fn receive_message<R>(stream: &mut R) -> Result<Message, PeerIoError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(stream).await?;
    Ok(Message::decode(&payload)?)
}

/// Encode and frame one message.
pub async fn send_message<W>(stream: &mut W, message: &Message) -> Result<(), PeerIoError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(stream, &message.encode()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::genesis_block;

    #[test]
    fn messages_round_trip_through_the_type_table() {
        let messages = vec![
            Message::GetBlocks(GetBlocksMsg {
                from_blockid: genesis_block().id(),
            }),
            Message::Inv(InvMsg {
                blocks: vec![genesis_block()],
            }),
            Message::GetUtxos(GetUTXOsMsg {}),
            Message::GetMempool(GetMempoolMsg {}),
            Message::GetActiveChain(GetActiveChainMsg {}),
            Message::AddPeer(AddPeerMsg {
                peer_hostname: "10.0.0.5".to_string(),
            }),
            Message::Transaction(Transaction::create_coinbase("1addr", 50, 0)),
            Message::Block(genesis_block()),
        ];
        for message in messages {
            let decoded = Message::decode(&message.encode()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(matches!(
            Message::decode(br#"{"_type":"SelfDestructMsg"}"#),
            Err(CodecError::UnknownType(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"blocks":[]}"#),
            Err(CodecError::MissingType)
        ));
    }

    #[tokio::test]
    async fn a_frame_split_across_buffers_decodes_once() {
        let message = Message::GetBlocks(GetBlocksMsg {
            from_blockid: genesis_block().id(),
        });
        let framed = crate::codec::encode_framed(&message.encode());

        let (mut client, mut server) = tokio::io::duplex(1024);
        let (first_half, second_half) = framed.split_at(framed.len() / 2);
        client.write_all(first_half).await.unwrap();
        client.flush().await.unwrap();
        let reader = tokio::spawn(async move { receive_message(&mut server).await });
        client.write_all(second_half).await.unwrap();
        client.flush().await.unwrap();

        let decoded = reader.await.unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn oversized_frames_are_refused_before_allocation() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&(MAX_MESSAGE_BYTES as u32 + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(PeerIoError::FrameTooLarge(_))
        ));
    }
}
