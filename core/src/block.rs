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

//! Merkle block type. Wire parsing and partial merkle tree validation are
//! handled by the peer session layer; blocks reach the chain with their
//! hash and matched transaction hashes already extracted.

use crate::consensus::DIFFICULTY_INTERVAL;
use crate::hash::Hash;

/// Height of a block that has not been connected to the chain yet.
pub const UNKNOWN_HEIGHT: u32 = u32::max_value();

/// A block header plus the transaction hashes that matched the bloom filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleBlock {
	/// Hash of this block's header.
	pub block_hash: Hash,
	/// Hash of the previous block in the chain.
	pub prev_block: Hash,
	/// Block timestamp, seconds since the unix epoch.
	pub timestamp: u32,
	/// Difficulty target in compact form.
	pub difficulty_target: u32,
	/// Total number of transactions in the block, zero for a bare header.
	pub total_tx: u32,
	/// Hashes of the transactions that matched the filter.
	pub tx_hashes: Vec<Hash>,
	/// Height in the chain, `UNKNOWN_HEIGHT` until linked to a parent.
	pub height: u32,
}

impl MerkleBlock {
	/// Whether this block sits on a difficulty retarget boundary. Transition
	/// blocks must be retained to verify the next retarget.
	pub fn is_transition(&self) -> bool {
		self.height != UNKNOWN_HEIGHT && self.height % DIFFICULTY_INTERVAL == 0
	}
}

// Two blocks are the same block iff they share a header hash. Checkpoint
// entries carry no transaction data but still compare equal to the full
// block at their height.
impl PartialEq for MerkleBlock {
	fn eq(&self, other: &MerkleBlock) -> bool {
		self.block_hash == other.block_hash
	}
}

impl Eq for MerkleBlock {}

#[cfg(test)]
mod test {
	use super::*;
	use crate::hash::ZERO_HASH;

	fn block_at(height: u32) -> MerkleBlock {
		MerkleBlock {
			block_hash: Hash([1; 32]),
			prev_block: ZERO_HASH,
			timestamp: 0,
			difficulty_target: 0x1e0ffff0,
			total_tx: 0,
			tx_hashes: vec![],
			height,
		}
	}

	#[test]
	fn transition_boundaries() {
		assert!(block_at(0).is_transition());
		assert!(block_at(2016).is_transition());
		assert!(block_at(40320).is_transition());
		assert!(!block_at(1).is_transition());
		assert!(!block_at(2015).is_transition());
		assert!(!block_at(UNKNOWN_HEIGHT).is_transition());
	}

	#[test]
	fn serde_round_trip() {
		let block = MerkleBlock {
			block_hash: Hash([1; 32]),
			prev_block: Hash([2; 32]),
			timestamp: 1317972665,
			difficulty_target: 0x1e0ffff0,
			total_tx: 3,
			tx_hashes: vec![Hash([3; 32])],
			height: 42,
		};
		let json = serde_json::to_string(&block).unwrap();
		let back: MerkleBlock = serde_json::from_str(&json).unwrap();
		assert_eq!(back.height, 42);
		assert_eq!(back.tx_hashes, block.tx_hashes);
	}

	#[test]
	fn equality_is_by_hash() {
		let mut a = block_at(5);
		let mut b = block_at(9);
		b.total_tx = 120;
		assert_eq!(a, b);
		a.block_hash = Hash([2; 32]);
		assert_ne!(a, b);
	}
}
