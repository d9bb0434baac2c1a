// Copyright 2018 The LiteSPV Developers
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

//! In-memory block index. Three independent maps with distinct keying:
//! known blocks by their own hash, orphans by the hash of the parent they
//! are waiting for, checkpoints by height.

use std::collections::{BTreeMap, HashMap};

use litespv_core::{Hash, MerkleBlock};

/// Upper bound on orphans retained, so a peer spraying unconnectable
/// blocks cannot exhaust memory.
const MAX_ORPHANS: usize = 100;

/// Index of every merkle block the manager is holding on to.
pub struct BlockStore {
	blocks: HashMap<Hash, MerkleBlock>,
	orphans: HashMap<Hash, MerkleBlock>,
	checkpoints: BTreeMap<u32, MerkleBlock>,
}

impl BlockStore {
	/// An empty store.
	pub fn new() -> BlockStore {
		BlockStore {
			blocks: HashMap::new(),
			orphans: HashMap::new(),
			checkpoints: BTreeMap::new(),
		}
	}

	/// Adds a block to the main index, replacing any previous instance.
	pub fn insert(&mut self, block: MerkleBlock) {
		self.blocks.insert(block.block_hash, block);
	}

	/// Looks a block up by its hash.
	pub fn get(&self, hash: &Hash) -> Option<&MerkleBlock> {
		self.blocks.get(hash)
	}

	/// Whether a block with this hash is indexed.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.blocks.contains_key(hash)
	}

	/// Evicts a block from the main index.
	pub fn remove(&mut self, hash: &Hash) -> Option<MerkleBlock> {
		self.blocks.remove(hash)
	}

	/// Number of blocks in the main index.
	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	/// Registers a compiled-in checkpoint; it also joins the main index so
	/// chain walks can terminate on it.
	pub fn add_checkpoint(&mut self, block: MerkleBlock) {
		self.checkpoints.insert(block.height, block.clone());
		self.insert(block);
	}

	/// The checkpoint at exactly this height, if one exists.
	pub fn checkpoint_at(&self, height: u32) -> Option<&MerkleBlock> {
		self.checkpoints.get(&height)
	}

	/// Height of the most recent compiled-in checkpoint.
	pub fn last_checkpoint_height(&self) -> u32 {
		self.checkpoints.keys().next_back().cloned().unwrap_or(0)
	}

	/// Stores an orphan, keyed by the parent it waits for. At capacity the
	/// orphan furthest from being connectable (greatest height, unknown
	/// heights first) is evicted.
	pub fn add_orphan(&mut self, block: MerkleBlock) {
		self.orphans.insert(block.prev_block, block);

		if self.orphans.len() > MAX_ORPHANS {
			let victim = self
				.orphans
				.values()
				.max_by_key(|b| (b.height, b.timestamp))
				.map(|b| b.prev_block);
			if let Some(key) = victim {
				debug!("orphan pool full, evicting entry for parent {}", key);
				self.orphans.remove(&key);
			}
		}
	}

	/// Takes the orphan waiting on the given parent hash, if any.
	pub fn take_orphan_of(&mut self, parent: &Hash) -> Option<MerkleBlock> {
		self.orphans.remove(parent)
	}

	/// Removes the orphan matching this exact block, returning whether one
	/// was dropped.
	pub fn remove_orphan(&mut self, block: &MerkleBlock) -> bool {
		match self.orphans.get(&block.prev_block) {
			Some(o) if o.block_hash == block.block_hash => {
				self.orphans.remove(&block.prev_block);
				true
			}
			_ => false,
		}
	}

	/// Number of orphans held.
	pub fn orphan_count(&self) -> usize {
		self.orphans.len()
	}

	/// Drops every orphan, e.g. because they were matched against a stale
	/// bloom filter.
	pub fn clear_orphans(&mut self) {
		self.orphans.clear();
	}
}

impl Default for BlockStore {
	fn default() -> BlockStore {
		BlockStore::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use litespv_core::UNKNOWN_HEIGHT;

	fn block(id: u8, prev: u8, height: u32) -> MerkleBlock {
		MerkleBlock {
			block_hash: Hash([id; 32]),
			prev_block: Hash([prev; 32]),
			timestamp: 1000 + u32::from(id),
			difficulty_target: 0x1e0ffff0,
			total_tx: 0,
			tx_hashes: vec![],
			height,
		}
	}

	#[test]
	fn three_maps_are_independent() {
		let mut store = BlockStore::new();
		store.insert(block(1, 0, 5));
		store.add_orphan(block(2, 9, UNKNOWN_HEIGHT));
		store.add_checkpoint(block(3, 0, 20160));

		// orphans are keyed by parent, not their own hash
		assert!(store.get(&Hash([2; 32])).is_none());
		assert!(store.take_orphan_of(&Hash([9; 32])).is_some());

		// checkpoints are keyed by height and join the main index
		assert!(store.checkpoint_at(20160).is_some());
		assert!(store.checkpoint_at(5).is_none());
		assert!(store.contains(&Hash([3; 32])));
		assert_eq!(store.last_checkpoint_height(), 20160);
	}

	#[test]
	fn orphan_pool_is_capped() {
		let mut store = BlockStore::new();
		for i in 0..(MAX_ORPHANS + 20) {
			let mut b = block((i % 200) as u8, 0, UNKNOWN_HEIGHT);
			// distinct parent keys
			b.prev_block = Hash([(i / 200) as u8 + 10; 32]);
			b.prev_block.0[0] = (i % 200) as u8;
			store.add_orphan(b);
		}
		assert!(store.orphan_count() <= MAX_ORPHANS);
	}

	#[test]
	fn remove_orphan_checks_identity() {
		let mut store = BlockStore::new();
		store.add_orphan(block(4, 7, UNKNOWN_HEIGHT));

		// same parent, different block: not removed
		assert!(!store.remove_orphan(&block(5, 7, UNKNOWN_HEIGHT)));
		assert_eq!(store.orphan_count(), 1);
		assert!(store.remove_orphan(&block(4, 7, UNKNOWN_HEIGHT)));
		assert_eq!(store.orphan_count(), 0);
	}
}
