// Copyright 2019 The LiteSPV Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use litespv_chain::{BlockContext, BlockStatus, Chain, WalletOp};
use litespv_core::consensus::{self, DIFFICULTY_INTERVAL, TARGET_TIMESPAN};
use litespv_core::{ChainTypes, Hash, MerkleBlock, UNKNOWN_HEIGHT};
use litespv_util as util;

const EARLIEST_KEY_TIME: u32 = 1486949366;
const TESTNET_GENESIS_TS: u32 = 1486949366;

fn always_valid(_: &MerkleBlock, _: &MerkleBlock, _: u32) -> bool {
	true
}

fn block_hash(id: u64) -> Hash {
	let mut bytes = [0u8; 32];
	bytes[..8].copy_from_slice(&id.to_le_bytes());
	bytes[30] = 0x7f;
	Hash(bytes)
}

fn tx_hash(id: u64) -> Hash {
	let mut bytes = [0u8; 32];
	bytes[..8].copy_from_slice(&id.to_le_bytes());
	bytes[30] = 0x55;
	Hash(bytes)
}

fn block_after(prev: &MerkleBlock, id: u64) -> MerkleBlock {
	MerkleBlock {
		block_hash: block_hash(id),
		prev_block: prev.block_hash,
		timestamp: prev.timestamp + 150,
		difficulty_target: prev.difficulty_target,
		total_tx: 1,
		tx_hashes: vec![tx_hash(id)],
		height: UNKNOWN_HEIGHT,
	}
}

fn ctx_at(now: u32, peer_last: u32) -> BlockContext {
	BlockContext {
		peer_last_block: peer_last,
		estimated_height: peer_last,
		now: i64::from(now),
	}
}

fn testnet_chain() -> Chain {
	Chain::new(ChainTypes::Testnet, EARLIEST_KEY_TIME, vec![], always_valid).unwrap()
}

#[test]
fn cold_start_lands_on_genesis() {
	util::init_test_logger();
	let chain = Chain::new(ChainTypes::Mainnet, 1486949366, vec![], always_valid).unwrap();
	assert_eq!(chain.last_block().height, 0);
	assert_eq!(
		format!("{}", chain.last_block().block_hash),
		"12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2"
	);
}

#[test]
fn extends_tip_and_links_back() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let b1 = block_after(&genesis, 1);
	let b2 = block_after(&b1, 2);
	let now = b2.timestamp;

	let r1 = chain.process_block(b1.clone(), &ctx_at(now, 10));
	assert_eq!(r1.status, BlockStatus::Extended);
	assert_eq!(r1.new_height, Some(1));
	assert_eq!(
		r1.wallet_ops,
		vec![WalletOp::SetTxHeights {
			tx_hashes: vec![tx_hash(1)],
			height: 1,
			timestamp: b1.timestamp / 2 + genesis.timestamp / 2,
		}]
	);

	let r2 = chain.process_block(b2.clone(), &ctx_at(now, 10));
	assert_eq!(r2.status, BlockStatus::Extended);
	assert_eq!(chain.last_block().height, 2);
	assert_eq!(chain.last_block().block_hash, b2.block_hash);

	// every block on the main chain links to a parent one height below
	let mut cur = chain.last_block().clone();
	while cur.height > 0 {
		let parent = chain.get_block(&cur.prev_block).expect("gap in chain").clone();
		assert_eq!(parent.height + 1, cur.height);
		cur = parent;
	}
	assert_eq!(cur.block_hash, genesis.block_hash);
}

#[test]
fn orphan_is_parked_then_resolved() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let b1 = block_after(&genesis, 1);
	let b2 = block_after(&b1, 2);
	let now = b2.timestamp;

	// the child arrives first and has to wait for its parent
	let r = chain.process_block(b2.clone(), &ctx_at(now, 0));
	assert_eq!(
		r.status,
		BlockStatus::Orphan {
			request_blocks: true
		}
	);
	assert_eq!(chain.orphan_count(), 1);

	// parent shows up, child is pulled out and becomes the new tip
	let r = chain.process_block(b1.clone(), &ctx_at(now, 0));
	assert_eq!(r.status, BlockStatus::Extended);
	let next = r.next_orphan.expect("child orphan should resolve");
	assert_eq!(next.block_hash, b2.block_hash);

	let r = chain.process_block(next, &ctx_at(now, 0));
	assert_eq!(r.status, BlockStatus::Extended);
	assert_eq!(chain.last_block().block_hash, b2.block_hash);
	assert_eq!(chain.orphan_count(), 0);
}

#[test]
fn consecutive_orphans_suppress_getblocks() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let missing = block_after(&genesis, 90);
	let o1 = block_after(&missing, 91);
	let o2 = block_after(&o1, 92);
	let now = o2.timestamp;

	let r = chain.process_block(o1.clone(), &ctx_at(now, 0));
	assert_eq!(
		r.status,
		BlockStatus::Orphan {
			request_blocks: true
		}
	);

	// o2 extends the orphan we just saw, no point asking again
	let r = chain.process_block(o2, &ctx_at(now, 0));
	assert_eq!(
		r.status,
		BlockStatus::Orphan {
			request_blocks: false
		}
	);
}

#[test]
fn week_old_orphan_is_dropped() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let missing = block_after(&genesis, 80);
	let orphan = block_after(&missing, 81);
	let now = orphan.timestamp + 8 * 24 * 60 * 60;

	let r = chain.process_block(orphan, &ctx_at(now, 0));
	assert_eq!(r.status, BlockStatus::StaleOrphan);
	assert_eq!(chain.orphan_count(), 0);
}

#[test]
fn reorg_of_depth_two() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	// main chain: a1, a2
	let a1 = block_after(&genesis, 11);
	let a2 = block_after(&a1, 12);
	// fork sharing a1's parent, one block longer
	let f1 = block_after(&genesis, 21);
	let f2 = block_after(&f1, 22);
	let f3 = block_after(&f2, 23);
	let now = f3.timestamp;

	assert_eq!(
		chain.process_block(a1.clone(), &ctx_at(now, 10)).status,
		BlockStatus::Extended
	);
	assert_eq!(
		chain.process_block(a2.clone(), &ctx_at(now, 10)).status,
		BlockStatus::Extended
	);

	assert_eq!(
		chain.process_block(f1.clone(), &ctx_at(now, 10)).status,
		BlockStatus::Fork
	);
	assert_eq!(
		chain.process_block(f2.clone(), &ctx_at(now, 10)).status,
		BlockStatus::Fork
	);
	assert_eq!(chain.last_block().block_hash, a2.block_hash);

	let r = chain.process_block(f3.clone(), &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::Reorged { fork_point: 0 });
	assert_eq!(chain.last_block().block_hash, f3.block_hash);
	assert_eq!(chain.last_block().height, 3);

	// wallet first unwinds past the fork point, then relearns the new
	// main chain tip-down
	assert_eq!(r.wallet_ops[0], WalletOp::UnconfirmAbove { height: 0 });
	let heights: Vec<u32> = r.wallet_ops[1..]
		.iter()
		.map(|op| match op {
			WalletOp::SetTxHeights { height, .. } => *height,
			_ => panic!("unexpected op"),
		})
		.collect();
	assert_eq!(heights, vec![3, 2, 1]);
	match &r.wallet_ops[2] {
		WalletOp::SetTxHeights { tx_hashes, .. } => {
			assert_eq!(tx_hashes, &vec![tx_hash(22)])
		}
		_ => panic!("unexpected op"),
	}
}

#[test]
fn duplicate_refreshes_main_chain_heights() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let b1 = block_after(&genesis, 31);
	let b2 = block_after(&b1, 32);
	let now = b2.timestamp;

	chain.process_block(b1.clone(), &ctx_at(now, 10));
	chain.process_block(b2.clone(), &ctx_at(now, 10));

	let r = chain.process_block(b1.clone(), &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::Duplicate);
	assert_eq!(
		r.wallet_ops,
		vec![WalletOp::SetTxHeights {
			tx_hashes: vec![tx_hash(31)],
			height: 1,
			timestamp: b1.timestamp / 2 + genesis.timestamp / 2,
		}]
	);
	// tip untouched, chain height unchanged
	assert_eq!(chain.last_block().block_hash, b2.block_hash);
}

#[test]
fn fork_below_last_checkpoint_is_ignored() {
	util::init_test_logger();
	// mainnet carries checkpoints far above any synthetic fork
	let mut chain =
		Chain::new(ChainTypes::Mainnet, 1317972665, vec![], always_valid).unwrap();
	let genesis = chain.last_block().clone();

	let a1 = block_after(&genesis, 41);
	let a2 = block_after(&a1, 42);
	let f1 = block_after(&genesis, 43);
	let now = a2.timestamp;

	chain.process_block(a1.clone(), &ctx_at(now, 10));
	chain.process_block(a2.clone(), &ctx_at(now, 10));

	let r = chain.process_block(f1, &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::ForkBelowCheckpoint);
	assert_eq!(chain.last_block().block_hash, a2.block_hash);
}

#[test]
fn checkpoint_mismatch_rejects_block() {
	util::init_test_logger();
	let mut chain =
		Chain::new(ChainTypes::Mainnet, 1317972665, vec![], always_valid).unwrap();
	let mut prev = chain.last_block().clone();
	let mut now = prev.timestamp;

	// march a synthetic chain up to just below the first real checkpoint
	for i in 1..20160u64 {
		let b = block_after(&prev, 1000 + i);
		now = b.timestamp;
		let r = chain.process_block(b.clone(), &ctx_at(now, 30000));
		assert_eq!(r.status, BlockStatus::Extended, "height {}", i);
		prev = b;
	}
	assert_eq!(chain.last_block().height, 20159);

	// a block at checkpoint height 20160 whose hash differs is invalid
	let wrong = block_after(&prev, 99999);
	let r = chain.process_block(wrong, &ctx_at(now, 30000));
	assert_eq!(r.status, BlockStatus::Invalid);
	assert_eq!(chain.last_block().height, 20159);
}

#[test]
fn retarget_boundary_difficulty_is_enforced() {
	util::init_test_logger();
	// real difficulty verification, synthetic timestamps arranged so the
	// closing interval ran for exactly the target timespan
	let mut chain = Chain::new(
		ChainTypes::Testnet,
		EARLIEST_KEY_TIME,
		vec![],
		consensus::verify_difficulty,
	)
	.unwrap();
	let mut prev = chain.last_block().clone();

	for i in 1..DIFFICULTY_INTERVAL as u64 {
		let mut b = block_after(&prev, 2000 + i);
		if i == u64::from(DIFFICULTY_INTERVAL) - 1 {
			b.timestamp = TESTNET_GENESIS_TS + TARGET_TIMESPAN;
		}
		let r = chain.process_block(b.clone(), &ctx_at(b.timestamp, 30000));
		assert_eq!(r.status, BlockStatus::Extended, "height {}", i);
		prev = b;
	}

	let now = prev.timestamp + 150;
	let mut bad = block_after(&prev, 5000);
	bad.difficulty_target = 0x1e0fff00;
	let r = chain.process_block(bad, &ctx_at(now, 30000));
	assert_eq!(r.status, BlockStatus::Invalid);

	// unchanged target is the correct retarget for an on-schedule interval
	let good = block_after(&prev, 5001);
	let r = chain.process_block(good.clone(), &ctx_at(now, 30000));
	assert_eq!(r.status, BlockStatus::Extended);
	assert_eq!(chain.last_block().height, DIFFICULTY_INTERVAL);
	// the boundary block is persisted immediately; a single block means
	// the host appends rather than replaces
	assert_eq!(r.save_blocks.len(), 1);
	assert_eq!(r.save_blocks[0].block_hash, good.block_hash);
}

#[test]
fn download_completion_saves_a_retarget_window() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let mut prev = chain.last_block().clone();
	let mut result = None;

	for i in 1..=5u64 {
		let b = block_after(&prev, 3000 + i);
		result = Some(chain.process_block(b.clone(), &ctx_at(b.timestamp, 5)));
		prev = b;
	}

	let r = result.unwrap();
	assert_eq!(r.status, BlockStatus::Extended);
	assert!(r.download_complete);
	// the whole young chain fits inside the save window; more than one
	// block tells the host to replace what it had
	assert_eq!(r.save_blocks.len(), 6);
	assert_eq!(r.save_blocks[0].height, 5);
}

#[test]
fn rescan_gap_parks_until_caught_up() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let genesis = chain.last_block().clone();

	let b1 = block_after(&genesis, 51);
	let b2 = block_after(&b1, 52);
	let b3 = block_after(&b2, 53);
	let now = b3.timestamp;

	chain.process_block(b1.clone(), &ctx_at(now, 10));
	chain.process_block(b2.clone(), &ctx_at(now, 10));

	// rescan rewinds the tip to the checkpoint below the wallet birthday
	chain.rewind_to_checkpoint(EARLIEST_KEY_TIME).unwrap();
	assert_eq!(chain.last_block().height, 0);

	// a freshly mined block lands way ahead of the rewound tip
	let r = chain.process_block(b3.clone(), &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::RescanGap);

	// the redownload walks the old blocks back in and the parked block
	// reconnects at the end
	let r = chain.process_block(b1.clone(), &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::Extended);
	let r = chain.process_block(b2.clone(), &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::Extended);
	let next = r.next_orphan.expect("parked block should reconnect");
	assert_eq!(next.block_hash, b3.block_hash);
	let r = chain.process_block(next, &ctx_at(now, 10));
	assert_eq!(r.status, BlockStatus::Extended);
	assert_eq!(chain.last_block().height, 3);
}

#[test]
fn constructor_splices_persisted_blocks() {
	util::init_test_logger();
	// persist a chain crossing a retarget boundary, then rebuild from it
	let genesis = testnet_chain().last_block().clone();

	let mut saved = vec![];
	let mut prev = genesis;
	for i in 1..=(DIFFICULTY_INTERVAL + 4) as u64 {
		let mut b = block_after(&prev, 4000 + i);
		b.height = i as u32;
		saved.push(b.clone());
		prev = b;
	}

	let tip_hash = saved.last().unwrap().block_hash;
	let chain = Chain::new(
		ChainTypes::Testnet,
		EARLIEST_KEY_TIME,
		saved,
		always_valid,
	)
	.unwrap();

	// the run descending from the transition block at 2016 is the tip
	assert_eq!(chain.last_block().height, DIFFICULTY_INTERVAL + 4);
	assert_eq!(chain.last_block().block_hash, tip_hash);
	let boundary = chain.last_block().clone();
	let mut cur = boundary;
	while cur.height > DIFFICULTY_INTERVAL {
		cur = chain.get_block(&cur.prev_block).unwrap().clone();
	}
	assert!(cur.is_transition());
}

#[test]
fn constructor_rejects_blocks_without_height() {
	util::init_test_logger();
	let genesis = testnet_chain().last_block().clone();
	let orphaned = block_after(&genesis, 6000);
	let res = Chain::new(
		ChainTypes::Testnet,
		EARLIEST_KEY_TIME,
		vec![orphaned],
		always_valid,
	);
	assert!(res.is_err());
}

#[test]
fn locators_decay_by_powers_of_two() {
	util::init_test_logger();
	let mut chain = testnet_chain();
	let mut prev = chain.last_block().clone();

	for i in 1..=40u64 {
		let b = block_after(&prev, 7000 + i);
		chain.process_block(b.clone(), &ctx_at(b.timestamp, 40));
		prev = b;
	}

	let locators = chain.block_locators();
	let heights: Vec<u32> = locators
		.iter()
		.filter_map(|h| chain.get_block(h).map(|b| b.height))
		.collect();
	assert_eq!(
		heights,
		vec![40, 39, 38, 37, 36, 35, 34, 33, 32, 31, 29, 25, 17, 1, 0]
	);
	assert_eq!(
		*locators.last().unwrap(),
		ChainTypes::Testnet.genesis_hash()
	);
}
