pub mod block;
pub mod transaction;

pub use block::{Block, BlockBuilder, GENESIS_PREV_BLOCK_HASH};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut, UnspentTxOut};
