//! Shared scaffolding: a low-difficulty network whose blocks mine in
//! microseconds, with fixed keys so runs are reproducible.
#![allow(dead_code)]

use std::collections::HashMap;

use tclib::chain::ChainState;
use tclib::crypto::{build_spend_message, PrivateKey};
use tclib::mining::{self, MineInterrupt};
use tclib::pow;
use tclib::types::{
    Block, BlockBuilder, OutPoint, Transaction, TxIn, TxOut, UnspentTxOut,
    GENESIS_PREV_BLOCK_HASH,
};
use tclib::Params;

/// Base timestamp for regtest chains, safely in the past.
pub const TS0: u32 = 1_600_000_000;

pub const REGTEST_BITS: u32 = 4;

pub fn alice() -> PrivateKey {
    PrivateKey::from_hex(&format!("{:0>64}", "1")).unwrap()
}

pub fn bob() -> PrivateKey {
    PrivateKey::from_hex(&format!("{:0>64}", "2")).unwrap()
}

pub fn regtest_params(period_in_blocks: usize) -> Params {
    Params {
        time_between_blocks_target: 60,
        difficulty_period_target: 60 * period_in_blocks as u64,
        period_in_blocks,
        initial_difficulty_bits: REGTEST_BITS,
    }
}

/// A chain whose genesis coinbase pays `pay_to`, mined against a long
/// retarget period so difficulty stays flat.
pub fn regtest_chain(pay_to: &str) -> ChainState {
    let genesis = mined(
        BlockBuilder::default()
            .prev_block_hash(GENESIS_PREV_BLOCK_HASH.to_string())
            .timestamp(TS0)
            .bits(REGTEST_BITS)
            .prepend_coinbase(Transaction::create_coinbase(pay_to, 5_000_000_000, 0))
            .seal()
            .unwrap(),
    );
    ChainState::with_genesis(regtest_params(100), genesis)
}

pub fn mined(block: Block) -> Block {
    mining::mine(&block, &MineInterrupt::new()).expect("regtest difficulty is always solvable")
}

/// Build and mine a block on an arbitrary parent. `height` feeds the
/// coinbase, fees come from whatever `txns` leave on the table.
pub fn child_of(
    chain: &ChainState,
    prev_id: &str,
    timestamp: u32,
    height: u32,
    txns: Vec<Transaction>,
    pay_to: &str,
) -> Block {
    let bits = chain.next_work_required(prev_id).unwrap();
    let base = Block {
        version: 0,
        prev_block_hash: prev_id.to_string(),
        merkle_hash: String::new(),
        timestamp,
        bits,
        nonce: 0,
        txns,
    };
    let fees = mining::calculate_fees(chain, &base);
    let coinbase =
        Transaction::create_coinbase(pay_to, pow::get_block_subsidy(height) + fees, height);
    mined(
        BlockBuilder {
            version: base.version,
            prev_block_hash: base.prev_block_hash,
            timestamp: base.timestamp,
            bits: base.bits,
            nonce: base.nonce,
            txns: base.txns,
        }
        .prepend_coinbase(coinbase)
        .seal()
        .unwrap(),
    )
}

/// Extend the active tip by one block at the given timestamp.
pub fn extend_tip(chain: &mut ChainState, timestamp: u32, pay_to: &str) -> Block {
    let prev_id = chain.tip().id();
    let height = chain.active_chain.len() as u32;
    let block = child_of(chain, &prev_id, timestamp, height, vec![], pay_to);
    assert_eq!(chain.connect_block(block.clone(), false), Some(0));
    block
}

/// A single-output transaction consuming `utxo`, signed by its owner.
pub fn spend(utxo: &UnspentTxOut, key: &PrivateKey, to_address: &str, value: u64) -> Transaction {
    let pubkey = key.public_key().to_bytes();
    let txouts = vec![TxOut {
        value,
        to_address: to_address.to_string(),
    }];
    let spend_message = build_spend_message(&utxo.outpoint(), &pubkey, 0, &txouts);
    Transaction {
        txins: vec![TxIn {
            to_spend: Some(utxo.outpoint()),
            unlock_sig: Some(key.sign(&spend_message)),
            unlock_pk: Some(pubkey),
            sequence: 0,
        }],
        txouts,
        locktime: None,
    }
}

pub fn coinbase_utxo_of(chain: &ChainState, block: &Block) -> UnspentTxOut {
    chain
        .utxo_set
        .get(&OutPoint {
            txid: block.txns[0].id(),
            txout_idx: 0,
        })
        .cloned()
        .expect("coinbase output is unspent")
}

/// The UTXO set must be exactly the outputs the active chain created minus
/// the outputs it spent.
pub fn assert_utxo_matches_chain(chain: &ChainState) {
    let mut expected: HashMap<OutPoint, u64> = HashMap::new();
    for block in &chain.active_chain {
        for txn in &block.txns {
            for txin in &txn.txins {
                if let Some(to_spend) = &txin.to_spend {
                    expected.remove(to_spend);
                }
            }
            let txid = txn.id();
            for (idx, txout) in txn.txouts.iter().enumerate() {
                expected.insert(
                    OutPoint {
                        txid: txid.clone(),
                        txout_idx: idx as u32,
                    },
                    txout.value,
                );
            }
        }
    }
    assert_eq!(chain.utxo_set.len(), expected.len());
    for (outpoint, value) in &expected {
        assert_eq!(
            chain.utxo_set.get(outpoint).map(|utxo| utxo.value),
            Some(*value),
            "utxo set diverges at {outpoint:?}"
        );
    }
}
