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

//! Chain acceptance engine. Every merkle block relayed by a peer runs
//! through `process_block`, which classifies it into exactly one arrival
//! case and returns what the caller has to do about it.

use std::collections::HashMap;

use litespv_core::consensus::{DIFFICULTY_INTERVAL, WEEK_SECS};
use litespv_core::{ChainTypes, Hash, MerkleBlock, UNKNOWN_HEIGHT};

use crate::error::{Error, ErrorKind};
use crate::store::BlockStore;
use crate::types::{BlockContext, BlockStatus, ProcessResult, WalletOp};

/// Pluggable difficulty check: `(block, prev, transition_time)`, where
/// `transition_time` is the timestamp of the block that started the
/// retarget interval being closed (zero off boundaries).
pub type DifficultyVerifier = fn(&MerkleBlock, &MerkleBlock, u32) -> bool;

// Bare headers newer than this far before the earliest wallet key cannot
// affect the wallet and are dropped on arrival.
const HEADER_CUTOFF_SECS: i64 = 5 * 24 * 60 * 60;

/// The main chain state: block index plus the current tip.
pub struct Chain {
	store: BlockStore,
	last_block: MerkleBlock,
	last_orphan: Option<Hash>,
	chain_type: ChainTypes,
	earliest_key_time: u32,
	verifier: DifficultyVerifier,
}

impl Chain {
	/// Builds the chain from compiled-in checkpoints plus whatever blocks
	/// the host persisted. The tip starts at genesis; persisted blocks
	/// must carry their height, are parked keyed by parent, and the run
	/// descending from the highest retarget-boundary block among them is
	/// spliced back into the index to become the tip.
	pub fn new(
		chain_type: ChainTypes,
		earliest_key_time: u32,
		blocks: Vec<MerkleBlock>,
		verifier: DifficultyVerifier,
	) -> Result<Chain, Error> {
		let mut store = BlockStore::new();
		let mut last_block: Option<MerkleBlock> = None;

		for cp in chain_type.checkpoints() {
			let block = cp.to_block();
			if cp.height == 0 {
				last_block = Some(block.clone());
			}
			store.add_checkpoint(block);
		}

		let mut pending: HashMap<Hash, MerkleBlock> = HashMap::new();
		let mut splice_from: Option<MerkleBlock> = None;

		for b in blocks {
			if b.height == UNKNOWN_HEIGHT {
				return Err(ErrorKind::UnknownBlockHeight(b.block_hash).into());
			}
			if b.is_transition()
				&& splice_from.as_ref().map(|s| b.height > s.height).unwrap_or(true)
			{
				splice_from = Some(b.clone());
			}
			pending.insert(b.prev_block, b);
		}

		let mut cur = splice_from;
		while let Some(b) = cur {
			pending.remove(&b.prev_block);
			store.insert(b.clone());
			cur = pending.remove(&b.block_hash);
			last_block = Some(b);
		}

		// blocks that did not link up stay parked as orphans
		for (_, b) in pending {
			store.add_orphan(b);
		}

		let last_block = last_block
			.ok_or_else(|| Error::from(ErrorKind::Other("no usable chain head".to_owned())))?;

		info!(
			"chain init: {} at {}",
			last_block.block_hash, last_block.height
		);

		Ok(Chain {
			store,
			last_block,
			last_orphan: None,
			chain_type,
			earliest_key_time,
			verifier,
		})
	}

	/// The current best tip.
	pub fn last_block(&self) -> &MerkleBlock {
		&self.last_block
	}

	/// Looks up an indexed block.
	pub fn get_block(&self, hash: &Hash) -> Option<&MerkleBlock> {
		self.store.get(hash)
	}

	/// Number of orphans currently parked.
	pub fn orphan_count(&self) -> usize {
		self.store.orphan_count()
	}

	/// Drops all parked orphans, e.g. when they were matched against a
	/// bloom filter that is being replaced.
	pub fn clear_orphans(&mut self) {
		self.store.clear_orphans();
		self.last_orphan = None;
	}

	/// Rewinds the tip to the most recent checkpoint at least a week older
	/// than the earliest wallet key, the starting point for a rescan.
	pub fn rewind_to_checkpoint(&mut self, earliest_key_time: u32) -> Result<(), Error> {
		let checkpoints = self.chain_type.checkpoints();
		for (i, cp) in checkpoints.iter().enumerate().rev() {
			if i == 0 || i64::from(cp.timestamp) + WEEK_SECS < i64::from(earliest_key_time) {
				let hash = Hash::from_hex(cp.hash)
					.map_err(|e| Error::from(ErrorKind::Other(e)))?;
				let block = self
					.store
					.get(&hash)
					.cloned()
					.ok_or_else(|| Error::from(ErrorKind::CheckpointMissing(cp.height)))?;
				debug!("rescan rewinding tip to checkpoint at {}", block.height);
				self.last_block = block;
				return Ok(());
			}
		}
		Ok(())
	}

	/// Block locator hashes for getblocks/getheaders: the 10 most recent
	/// block hashes descending, then doubling the step back each time,
	/// finishing with the genesis hash.
	pub fn block_locators(&self) -> Vec<Hash> {
		let mut locators = vec![];
		let mut step = 1;
		let mut block = Some(self.last_block.clone());

		while let Some(b) = block {
			if b.height == 0 {
				break;
			}
			locators.push(b.block_hash);
			if locators.len() >= 10 {
				step *= 2;
			}

			let mut cur = Some(b);
			for _ in 0..step {
				cur = match cur {
					Some(x) => self.store.get(&x.prev_block).cloned(),
					None => break,
				};
			}
			block = cur;
		}

		locators.push(self.chain_type.genesis_hash());
		locators
	}

	/// Runs a relayed block through the acceptance pipeline. The caller
	/// holds whatever lock serializes arrivals; classification is
	/// deterministic under that serialization.
	pub fn process_block(&mut self, mut block: MerkleBlock, ctx: &BlockContext) -> ProcessResult {
		let prev = self.store.get(&block.prev_block).cloned();
		let mut tx_time = block.timestamp;

		if let Some(ref prev) = prev {
			tx_time = block.timestamp / 2 + prev.timestamp / 2;
			block.height = prev.height.wrapping_add(1);
		}

		let mut result = if block.total_tx == 0
			&& i64::from(block.timestamp)
				> i64::from(self.earliest_key_time) - HEADER_CUTOFF_SECS
		{
			// a bare header this new cannot hold wallet history
			ProcessResult::with_status(BlockStatus::HeaderTooNew)
		} else if prev.is_none() {
			self.accept_orphan(block.clone(), ctx)
		} else {
			let prev = prev.unwrap();
			if !self.verify_block(&block, &prev) {
				warn!(
					"peer relayed invalid block {} at {}",
					block.block_hash, block.height
				);
				ProcessResult::with_status(BlockStatus::Invalid)
			} else if block.prev_block == self.last_block.block_hash {
				self.extend_tip(block.clone(), tx_time, ctx)
			} else if self.store.contains(&block.block_hash) {
				self.accept_duplicate(block.clone(), tx_time)
			} else if self.last_block.height < ctx.peer_last_block
				&& block.height > self.last_block.height + 1
			{
				// new block mined while the download is still catching up;
				// park it until the gap closes
				debug!(
					"marking new block at {} as orphan until rescan completes",
					block.height
				);
				self.store.add_orphan(block.clone());
				self.last_orphan = Some(block.block_hash);
				ProcessResult::with_status(BlockStatus::RescanGap)
			} else if block.height <= self.store.last_checkpoint_height() {
				debug!(
					"ignoring block on fork older than most recent checkpoint, block at {}, hash {}",
					block.height, block.block_hash
				);
				ProcessResult::with_status(BlockStatus::ForkBelowCheckpoint)
			} else {
				self.accept_fork(block.clone(), ctx)
			}
		};

		// whatever survived with a known height can raise the network
		// estimate and may have a child waiting in the orphan pool
		let survived = match result.status {
			BlockStatus::Extended
			| BlockStatus::Duplicate
			| BlockStatus::Fork
			| BlockStatus::Reorged { .. }
			| BlockStatus::RescanGap => true,
			_ => false,
		};

		if survived && block.height != UNKNOWN_HEIGHT {
			result.new_height = Some(block.height);
			if block.height > ctx.estimated_height {
				result.raised_estimate = Some(block.height);
			}
			result.next_orphan = self.store.take_orphan_of(&block.block_hash);
		}

		result
	}

	fn accept_orphan(&mut self, block: MerkleBlock, ctx: &BlockContext) -> ProcessResult {
		if i64::from(block.timestamp) + WEEK_SECS < ctx.now {
			return ProcessResult::with_status(BlockStatus::StaleOrphan);
		}

		debug!(
			"relayed orphan block {}, previous {}, last block is {} at {}",
			block.block_hash, block.prev_block, self.last_block.block_hash, self.last_block.height
		);

		// ask for the gap, unless we are mid-sync or we already did when
		// this orphan's predecessor arrived
		let request_blocks = self.last_block.height >= ctx.peer_last_block
			&& self.last_orphan != Some(block.prev_block);

		self.last_orphan = Some(block.block_hash);
		self.store.add_orphan(block);

		ProcessResult::with_status(BlockStatus::Orphan { request_blocks })
	}

	fn extend_tip(&mut self, block: MerkleBlock, tx_time: u32, ctx: &BlockContext) -> ProcessResult {
		if block.height % 500 == 0
			|| !block.tx_hashes.is_empty()
			|| block.height >= ctx.peer_last_block
		{
			debug!("adding block at {}", block.height);
		}

		self.store.insert(block.clone());
		self.last_block = block.clone();

		let mut result = ProcessResult::with_status(BlockStatus::Extended);
		result.wallet_ops.push(WalletOp::SetTxHeights {
			tx_hashes: block.tx_hashes.clone(),
			height: block.height,
			timestamp: tx_time,
		});

		if block.is_transition() {
			// transition blocks anchor the next retarget check, save right away
			result.save_blocks = self.collect_for_save(&block, 1);
		}

		if block.height == ctx.estimated_height {
			self.finish_download(&block, &mut result);
		}

		result
	}

	fn accept_duplicate(&mut self, block: MerkleBlock, tx_time: u32) -> ProcessResult {
		debug!("relayed existing block at {}", block.height);

		// walk the main chain down to this height to see which side of a
		// fork the duplicate is on
		let mut b = Some(self.last_block.clone());
		while let Some(ref cur) = b {
			if cur.height <= block.height {
				break;
			}
			b = self.store.get(&cur.prev_block).cloned();
		}

		let mut result = ProcessResult::with_status(BlockStatus::Duplicate);

		if b.as_ref().map(|x| x.block_hash) == Some(block.block_hash) {
			// on the main chain: refresh tx heights, and refresh the tip
			// instance when the duplicate is the tip itself
			result.wallet_ops.push(WalletOp::SetTxHeights {
				tx_hashes: block.tx_hashes.clone(),
				height: block.height,
				timestamp: tx_time,
			});
			if block.height == self.last_block.height {
				self.last_block = block.clone();
			}
		}

		self.store.insert(block.clone());
		if self.store.remove_orphan(&block) && self.last_orphan == Some(block.block_hash) {
			self.last_orphan = None;
		}

		result
	}

	fn accept_fork(&mut self, block: MerkleBlock, ctx: &BlockContext) -> ProcessResult {
		info!("chain fork reached height {}", block.height);
		self.store.insert(block.clone());

		if block.height <= self.last_block.height {
			return ProcessResult::with_status(BlockStatus::Fork);
		}

		// the fork overtook the main chain: walk both tips back in
		// lockstep to the common ancestor
		let mut b = Some(block.clone());
		let mut b2 = Some(self.last_block.clone());
		while let (Some(x), Some(y)) = (b.clone(), b2.clone()) {
			if x.block_hash == y.block_hash {
				break;
			}
			b = self.store.get(&x.prev_block).cloned();
			if let Some(ref nb) = b {
				if nb.height < y.height {
					b2 = self.store.get(&y.prev_block).cloned();
				}
			}
		}

		let ancestor = match (b, b2) {
			(Some(x), Some(y)) if x.block_hash == y.block_hash => x,
			_ => {
				// the fork does not connect back inside our retention
				// window; keep the current chain
				warn!(
					"fork tip {} at {} has no reachable common ancestor",
					block.block_hash, block.height
				);
				return ProcessResult::with_status(BlockStatus::Fork);
			}
		};

		info!(
			"reorganizing chain from height {}, new height is {}",
			ancestor.height, block.height
		);

		let mut result = ProcessResult::with_status(BlockStatus::Reorged {
			fork_point: ancestor.height,
		});

		result.wallet_ops.push(WalletOp::UnconfirmAbove {
			height: ancestor.height,
		});

		// replay the new main chain from its tip down to the ancestor
		let mut cur = Some(block.clone());
		while let Some(x) = cur {
			if x.height <= ancestor.height {
				break;
			}
			let mut timestamp = x.timestamp;
			let tx_hashes = x.tx_hashes.clone();
			let height = x.height;
			cur = self.store.get(&x.prev_block).cloned();
			if let Some(ref p) = cur {
				timestamp = timestamp / 2 + p.timestamp / 2;
			}
			result.wallet_ops.push(WalletOp::SetTxHeights {
				tx_hashes,
				height,
				timestamp,
			});
		}

		self.last_block = block.clone();

		if block.height == ctx.estimated_height {
			self.finish_download(&block, &mut result);
		}

		result
	}

	// The chain download just reached the estimated network height: hand
	// the host enough recent blocks to re-verify the next retarget.
	fn finish_download(&mut self, block: &MerkleBlock, result: &mut ProcessResult) {
		let count = (block.height % DIFFICULTY_INTERVAL) + DIFFICULTY_INTERVAL + 1;
		result.save_blocks = self.collect_for_save(block, count as usize);
		result.download_complete = true;
	}

	fn collect_for_save(&self, from: &MerkleBlock, count: usize) -> Vec<MerkleBlock> {
		let mut out = Vec::with_capacity(count.min(64));
		let mut cur = Some(from.clone());
		while let Some(b) = cur {
			if out.len() >= count {
				break;
			}
			cur = self.store.get(&b.prev_block).cloned();
			out.push(b);
		}
		out
	}

	// Difficulty and checkpoint validation. On a retarget boundary the
	// interval-start block is located by walking back DIFFICULTY_INTERVAL
	// parents; non-boundary blocks below it are evicted along the way to
	// reclaim memory.
	fn verify_block(&mut self, block: &MerkleBlock, prev: &MerkleBlock) -> bool {
		let mut transition_time = 0;

		if block.height % DIFFICULTY_INTERVAL == 0 {
			let mut b = Some(block.clone());
			for _ in 0..DIFFICULTY_INTERVAL {
				b = match b {
					Some(x) => self.store.get(&x.prev_block).cloned(),
					None => break,
				};
			}

			match b {
				None => {
					warn!(
						"missing previous difficulty transition, can't verify block {}",
						block.block_hash
					);
					return false;
				}
				Some(transition) => {
					transition_time = transition.timestamp;
					let mut prev_hash = transition.prev_block;
					while let Some(x) = self.store.get(&prev_hash).cloned() {
						prev_hash = x.prev_block;
						if x.height % DIFFICULTY_INTERVAL != 0 {
							self.store.remove(&x.block_hash);
						}
					}
				}
			}
		}

		if !(self.verifier)(block, prev, transition_time) {
			warn!(
				"relayed block with invalid difficulty target {:x}, block {}",
				block.difficulty_target, block.block_hash
			);
			return false;
		}

		if let Some(checkpoint) = self.store.checkpoint_at(block.height) {
			if checkpoint.block_hash != block.block_hash {
				warn!(
					"relayed a block that differs from the checkpoint at height {}, block {}, expected {}",
					block.height, block.block_hash, checkpoint.block_hash
				);
				return false;
			}
		}

		true
	}
}
