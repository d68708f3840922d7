//! Side branches, reorganization, rollback and orphan handling.

mod common;

use common::*;

#[test]
fn a_longer_side_branch_takes_over_the_active_chain() {
    let miner = alice().public_key().to_address();
    let rival = bob().public_key().to_address();
    let mut chain = regtest_chain(&miner);
    let genesis_id = chain.tip().id();

    let a1 = extend_tip(&mut chain, TS0 + 1, &miner);
    let a2 = extend_tip(&mut chain, TS0 + 2, &miner);
    assert_eq!(chain.active_chain.len(), 3);

    // a rival branch forks off genesis
    let b1 = child_of(&chain, &genesis_id, TS0 + 10, 1, vec![], &rival);
    assert_eq!(chain.connect_block(b1.clone(), false), Some(1));
    let b2 = child_of(&chain, &b1.id(), TS0 + 11, 2, vec![], &rival);
    assert_eq!(chain.connect_block(b2.clone(), false), Some(1));

    // two branch blocks only tie the active height; nothing moves
    assert_eq!(chain.active_chain.len(), 3);
    assert_eq!(chain.tip().id(), a2.id());
    assert_eq!(chain.side_branches.len(), 1);

    // the third tips the balance
    let b3 = child_of(&chain, &b2.id(), TS0 + 12, 3, vec![], &rival);
    assert_eq!(chain.connect_block(b3.clone(), false), Some(1));

    assert_eq!(chain.active_chain.len(), 4);
    assert_eq!(chain.tip().id(), b3.id());
    let active_ids: Vec<_> = chain.active_chain.iter().map(|b| b.id()).collect();
    assert_eq!(
        active_ids,
        vec![genesis_id, b1.id(), b2.id(), b3.id()]
    );

    // the dethroned tail survives as a side branch
    assert_eq!(chain.side_branches.len(), 1);
    let demoted: Vec<_> = chain.side_branches[0].iter().map(|b| b.id()).collect();
    assert_eq!(demoted, vec![a1.id(), a2.id()]);

    assert_utxo_matches_chain(&chain);
}

#[test]
fn a_failing_branch_block_rolls_the_reorg_back() {
    let miner = alice().public_key().to_address();
    let rival = bob().public_key().to_address();
    let mut chain = regtest_chain(&miner);
    let genesis_id = chain.tip().id();

    extend_tip(&mut chain, TS0 + 1, &miner);
    let a2 = extend_tip(&mut chain, TS0 + 2, &miner);
    let original_ids: Vec<_> = chain.active_chain.iter().map(|b| b.id()).collect();

    let b1 = child_of(&chain, &genesis_id, TS0 + 10, 1, vec![], &rival);
    assert_eq!(chain.connect_block(b1.clone(), false), Some(1));
    let b2 = child_of(&chain, &b1.id(), TS0 + 11, 2, vec![], &rival);
    assert_eq!(chain.connect_block(b2.clone(), false), Some(1));

    // a block whose merkle commitment lies about its transactions; it can
    // only be smuggled into the branch directly, since validation would
    // refuse it anywhere
    let mut b3 = child_of(&chain, &b2.id(), TS0 + 12, 3, vec![], &rival);
    b3.merkle_hash = "00".repeat(32);
    b3 = mined(b3);
    chain.side_branches[0].push(b3);

    assert!(!chain.reorg_if_necessary());

    // the original chain is back and the poisoned branch stayed put
    let restored_ids: Vec<_> = chain.active_chain.iter().map(|b| b.id()).collect();
    assert_eq!(restored_ids, original_ids);
    assert_eq!(chain.tip().id(), a2.id());
    assert_eq!(chain.side_branches.len(), 1);
    assert_eq!(chain.side_branches[0].len(), 3);

    assert_utxo_matches_chain(&chain);
}

#[test]
fn a_block_with_an_unknown_parent_is_parked_as_an_orphan() {
    let miner = alice().public_key().to_address();
    let mut chain = regtest_chain(&miner);

    let orphan = child_of(&chain, &chain.tip().id(), TS0 + 1, 1, vec![], &miner);
    let mut detached = orphan.clone();
    detached.prev_block_hash = "ab".repeat(32);
    let detached = mined(detached);

    assert_eq!(chain.connect_block(detached.clone(), false), None);
    assert_eq!(chain.active_chain.len(), 1);
    assert_eq!(chain.orphan_blocks.len(), 1);
    assert_eq!(chain.orphan_blocks[0].id(), detached.id());
}

#[test]
fn duplicate_blocks_are_ignored_silently() {
    let miner = alice().public_key().to_address();
    let mut chain = regtest_chain(&miner);

    let block = extend_tip(&mut chain, TS0 + 1, &miner);
    assert_eq!(chain.connect_block(block, false), None);
    assert_eq!(chain.active_chain.len(), 2);
}

#[test]
fn disconnect_restores_spent_utxos_and_refills_the_mempool() {
    let miner_key = alice();
    let miner = miner_key.public_key().to_address();
    let rival = bob().public_key().to_address();
    let mut chain = regtest_chain(&miner);

    extend_tip(&mut chain, TS0 + 1, &miner);
    extend_tip(&mut chain, TS0 + 2, &miner);

    // height 2: the genesis coinbase has matured, spend it
    let genesis_utxo = coinbase_utxo_of(&chain, &chain.active_chain[0].clone());
    let payment = spend(&genesis_utxo, &miner_key, &rival, 4_000_000_000);
    let payment_id = payment.id();
    let prev_id = chain.tip().id();
    let spender = child_of(&chain, &prev_id, TS0 + 3, 3, vec![payment], &miner);
    assert_eq!(chain.connect_block(spender, false), Some(0));

    // connecting consumed the genesis coinbase output
    assert!(chain.utxo_set.get(&genesis_utxo.outpoint()).is_none());
    assert!(!chain.mempool.contains(&payment_id));
    assert_utxo_matches_chain(&chain);

    let removed = chain.disconnect_block().unwrap();
    assert!(removed.txns.iter().any(|txn| txn.id() == payment_id));

    // the spend is pending again and its input is back
    assert!(chain.mempool.contains(&payment_id));
    let restored = chain.utxo_set.get(&genesis_utxo.outpoint()).unwrap();
    assert_eq!(restored.value, 5_000_000_000);
    assert!(restored.is_coinbase);
    assert_eq!(restored.height, 0);
    assert_utxo_matches_chain(&chain);
}
