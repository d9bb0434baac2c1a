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

//! Types shared by the chain engine and its caller.

use litespv_core::{Hash, MerkleBlock};

/// Context the caller supplies with each arriving block.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext {
	/// Chain height the relaying peer claims to be at.
	pub peer_last_block: u32,
	/// Current estimate of the network height.
	pub estimated_height: u32,
	/// Wall clock, seconds since the unix epoch.
	pub now: i64,
}

/// A wallet mutation the engine wants applied. Ops must be applied in the
/// order returned; a reorg interleaves an unconfirm with re-confirmations.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletOp {
	/// Record the given transactions at a height and timestamp.
	SetTxHeights {
		/// Hashes of the affected transactions.
		tx_hashes: Vec<Hash>,
		/// Confirming block height.
		height: u32,
		/// Block timestamp averaged with the parent's.
		timestamp: u32,
	},
	/// Mark all transactions above the height as unconfirmed again.
	UnconfirmAbove {
		/// Height of the last block that stays confirmed.
		height: u32,
	},
}

/// How an arriving block was classified. Mirrors the arrival cases of the
/// acceptance pipeline one to one.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStatus {
	/// A bare header newer than anything the wallet could care about.
	HeaderTooNew,
	/// Stored in the orphan pool. `request_blocks` asks the caller to
	/// issue a getblocks toward the gap.
	Orphan {
		/// Whether a getblocks should be sent for the missing range.
		request_blocks: bool,
	},
	/// An orphan more than a week old, dropped outright.
	StaleOrphan,
	/// Failed the difficulty or checkpoint checks; the relayer is
	/// misbehaving.
	Invalid,
	/// Extended the main chain tip.
	Extended,
	/// Already known. When on the main chain, tx heights were refreshed.
	Duplicate,
	/// Arrived ahead of the tip while a chain download is running; parked
	/// as an orphan until the download catches up.
	RescanGap,
	/// Sits on a fork at or below the most recent checkpoint; ignored.
	ForkBelowCheckpoint,
	/// Stored on a fork that has not overtaken the main chain.
	Fork,
	/// The fork overtook the main chain and is now the main chain.
	Reorged {
		/// Height of the common ancestor both chains share.
		fork_point: u32,
	},
}

/// Everything the caller needs in order to act on a processed block.
#[derive(Debug)]
pub struct ProcessResult {
	/// Arrival classification.
	pub status: BlockStatus,
	/// Final height of the block when it survived with one.
	pub new_height: Option<u32>,
	/// Wallet mutations, in application order.
	pub wallet_ops: Vec<WalletOp>,
	/// Blocks the host should persist, newest first. A single block adds
	/// to what the host already has; a longer run replaces it.
	pub save_blocks: Vec<MerkleBlock>,
	/// The chain download finished with this block.
	pub download_complete: bool,
	/// New network height estimate, when this block raised it.
	pub raised_estimate: Option<u32>,
	/// An orphan whose parent just connected; the caller feeds it back
	/// through the full arrival path.
	pub next_orphan: Option<MerkleBlock>,
}

impl ProcessResult {
	pub(crate) fn with_status(status: BlockStatus) -> ProcessResult {
		ProcessResult {
			status,
			new_height: None,
			wallet_ops: vec![],
			save_blocks: vec![],
			download_complete: false,
			raised_estimate: None,
			next_orphan: None,
		}
	}
}
