//! Chain synchronization and head-selection scenarios: a second store
//! adopting another node's blocks, and the strictly-greater-height rule.

use ferrocoin::{Block, Blockchain, Transaction, UTXOSet, Wallet};
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

#[test]
fn test_fresh_node_adopts_peer_chain() {
    let dir = tempdir().unwrap();
    let miner = Wallet::new().unwrap();
    let addr = miner.get_address();

    // P1 mines three blocks on top of genesis
    let p1 = Blockchain::create_blockchain_with_path(
        &addr,
        dir.path().join("p1").to_str().unwrap(),
    )
    .unwrap();
    for _ in 0..3 {
        let coinbase = Transaction::new_coinbase_tx(&addr, b"").unwrap();
        p1.mine_block(&[coinbase], &AtomicBool::new(false)).unwrap();
    }
    assert_eq!(p1.best_height(), 3);

    // P2 starts empty and fetches the announced blocks oldest-first, the
    // order the sync protocol requests them in
    let p2 =
        Blockchain::open_blockchain_with_path(dir.path().join("p2").to_str().unwrap()).unwrap();
    assert!(p2.is_empty());

    let announced = p1.get_block_hashes(); // head to genesis
    for hash in announced.iter().rev() {
        let block = p1.get_block(hash).unwrap().unwrap();
        p2.add_block(&block).unwrap();
    }

    assert_eq!(p2.best_height(), 3);
    assert_eq!(p2.get_block_hashes(), p1.get_block_hashes());

    // and the rebuilt index agrees with the miner's rewards
    let utxo_set = UTXOSet::new(p2.clone());
    utxo_set.reindex().unwrap();
    let pub_key_hash = ferrocoin::hash_pub_key(miner.get_public_key());
    let total: i64 = utxo_set
        .find_utxo(&pub_key_hash)
        .unwrap()
        .iter()
        .map(|out| out.get_value())
        .sum();
    assert_eq!(total, 4 * ferrocoin::SUBSIDY);
}

#[test]
fn test_equal_height_block_is_stored_but_not_adopted() {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();
    let rival = Wallet::new().unwrap();
    let addr = wallet.get_address();

    let blockchain = Blockchain::create_blockchain_with_path(
        &addr,
        dir.path().join("chain").to_str().unwrap(),
    )
    .unwrap();
    let genesis_hash = blockchain.get_tip_hash();

    let coinbase = Transaction::new_coinbase_tx(&addr, b"").unwrap();
    let first_seen = blockchain
        .mine_block(&[coinbase], &AtomicBool::new(false))
        .unwrap();
    assert_eq!(blockchain.get_tip_hash(), first_seen.get_hash());

    // a rival block at the same height arrives later
    let rival_cb = Transaction::new_coinbase_tx(&rival.get_address(), b"rival").unwrap();
    let rival_block = Block::new_block(
        first_seen.get_timestamp() + 1,
        genesis_hash,
        &[rival_cb],
        1,
        first_seen.get_difficulty(),
        &AtomicBool::new(false),
    )
    .unwrap();

    let adopted = blockchain.add_block(&rival_block).unwrap();
    assert!(!adopted);
    // stored, but the first-seen head stands
    assert!(blockchain.contains(rival_block.get_hash()).unwrap());
    assert_eq!(blockchain.get_tip_hash(), first_seen.get_hash());

    // a higher block on the rival branch does move the head
    let rival_cb2 = Transaction::new_coinbase_tx(&rival.get_address(), b"rival2").unwrap();
    let rival_child = Block::new_block(
        first_seen.get_timestamp() + 2,
        rival_block.get_hash().to_vec(),
        &[rival_cb2],
        2,
        rival_block.get_difficulty(),
        &AtomicBool::new(false),
    )
    .unwrap();
    let adopted = blockchain.add_block(&rival_child).unwrap();
    assert!(adopted);
    assert_eq!(blockchain.get_tip_hash(), rival_child.get_hash());
    assert_eq!(blockchain.best_height(), 2);
}

#[test]
fn test_duplicate_block_is_ignored() {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();

    let blockchain = Blockchain::create_blockchain_with_path(
        &wallet.get_address(),
        dir.path().join("chain").to_str().unwrap(),
    )
    .unwrap();
    let genesis = blockchain.last_block().unwrap();

    assert!(!blockchain.add_block(&genesis).unwrap());
    assert_eq!(blockchain.best_height(), 0);
    assert_eq!(blockchain.get_block_hashes().len(), 1);
}

#[test]
fn test_peer_blocks_round_trip_through_the_wire_encoding() {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();

    let blockchain = Blockchain::create_blockchain_with_path(
        &wallet.get_address(),
        dir.path().join("chain").to_str().unwrap(),
    )
    .unwrap();
    let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), b"").unwrap();
    let block = blockchain
        .mine_block(&[coinbase], &AtomicBool::new(false))
        .unwrap();

    let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoded.get_hash(), block.get_hash());
}
