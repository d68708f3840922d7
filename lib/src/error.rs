use thiserror::Error;

use crate::types::{Block, Transaction};

/// Transaction rejection. A transaction whose referenced UTXO cannot be
/// resolved anywhere is carried in the `Orphan` variant so the caller can
/// park it rather than drop it.
#[derive(Debug, Error)]
pub enum TxnValidationError {
    #[error("transaction validation failed: {0}")]
    Invalid(String),
    #[error("transaction references an unknown UTXO")]
    Orphan(Box<Transaction>),
}

/// Block rejection. A block whose parent is unknown is carried in the
/// `Orphan` variant.
#[derive(Debug, Error)]
pub enum BlockValidationError {
    #[error("block validation failed: {0}")]
    Invalid(String),
    #[error("block parent not found")]
    Orphan(Box<Block>),
}

/// Raised while checking an input's unlocking signature. Converted into a
/// `TxnValidationError` at the validation boundary.
#[derive(Debug, Error)]
pub enum SpendUnlockError {
    #[error("input carries no public key")]
    MissingKey,
    #[error("input carries no signature")]
    MissingSignature,
    #[error("input spends nothing")]
    MissingOutPoint,
    #[error("public key does not hash to the UTXO address")]
    AddressMismatch,
    #[error("public key is malformed")]
    MalformedKey,
    #[error("signature is malformed")]
    MalformedSignature,
    #[error("signature does not verify")]
    BadSignature,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload carries no _type tag")]
    MissingType,
    #[error("unknown payload type {0:?}")]
    UnknownType(String),
    #[error("truncated frame")]
    TruncatedFrame,
}

#[derive(Debug, Error)]
pub enum PeerIoError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("peer timed out")]
    Timeout,
    #[error("frame of {0} bytes exceeds the message limit")]
    FrameTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("assembled block has no transactions")]
    Empty,
    #[error("assembled block exceeds the serialized size limit")]
    Oversize,
    #[error("previous block not found")]
    UnknownParent,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("wallet file does not hold a valid secp256k1 key")]
    InvalidKey,
}
