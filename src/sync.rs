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

//! Block arrival handling and the post-sync mempool phase.

use std::sync::Arc;

use chrono::Utc;

use litespv_chain::{BlockContext, BlockStatus, WalletOp};
use litespv_core::bloom::{BLOOM_DEFAULT_FALSEPOSITIVE_RATE, BLOOM_REDUCED_FALSEPOSITIVE_RATE};
use litespv_core::{Hash, MerkleBlock, ZERO_HASH, TX_UNCONFIRMED};
use litespv_p2p::{ConnectStatus, PeerFlags, PeerSession, PEER_MAX_CONNECTIONS};

use crate::manager::{PeerManager, State, PROTOCOL_TIMEOUT};

impl PeerManager {
	pub(crate) fn handle_relayed_block(&self, peer: &Arc<dyn PeerSession>, block: MerkleBlock) {
		let now = Utc::now().timestamp();
		let mut saves: Vec<Vec<MerkleBlock>> = vec![];
		let mut notify_status = false;
		{
			let mut state = self.state.lock();

			self.track_false_positives(&mut state, peer, &block);

			if state.bloom_filter.is_none() {
				// a filter update is in flight, the block may be missing
				// wallet transactions; drop it and wait for the refill
				if state.is_download_peer(peer) && state.is_syncing() {
					peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
					state.connect_failure_count = 0;
				}
			} else {
				// resolved orphans re-enter the pipeline through a work
				// queue instead of recursion
				let mut queue = vec![block];
				while let Some(b) = queue.pop() {
					let ctx = BlockContext {
						peer_last_block: peer.last_block(),
						estimated_height: state.estimated_height,
						now,
					};
					let result = state.chain.process_block(b, &ctx);

					for op in &result.wallet_ops {
						match op {
							WalletOp::SetTxHeights {
								tx_hashes,
								height,
								timestamp,
							} => self.update_tx(&mut state, tx_hashes, *height, *timestamp),
							WalletOp::UnconfirmAbove { height } => {
								self.wallet.set_tx_unconfirmed_after(*height)
							}
						}
					}

					match result.status {
						BlockStatus::HeaderTooNew => {
							if state.is_download_peer(peer) && state.is_syncing() {
								peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
							}
						}
						BlockStatus::Orphan { request_blocks } => {
							if request_blocks {
								debug!("calling getblocks toward orphan gap");
								let locators = state.chain.block_locators();
								peer.send_getblocks(locators, ZERO_HASH);
							}
						}
						BlockStatus::Invalid => {
							self.peer_misbehavin(&mut state, peer);
						}
						BlockStatus::Extended => {
							if let Some(height) = result.new_height {
								if let Some(dp) = state.download_peer.clone() {
									dp.set_current_block_height(height);
								}
								if height < state.estimated_height
									&& state.is_download_peer(peer)
								{
									peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
									// our request did not time out
									state.connect_failure_count = 0;
								}
							}
						}
						_ => {}
					}

					if let Some(est) = result.raised_estimate {
						state.estimated_height = est;
					}
					if !result.save_blocks.is_empty() {
						saves.push(result.save_blocks);
					}
					if result.download_complete {
						self.load_mempools(&mut state);
					}
					if let Some(height) = result.new_height {
						if height >= peer.last_block() {
							// confirmations may have changed
							notify_status = true;
						}
					}
					if let Some(next) = result.next_orphan {
						queue.push(next);
					}
				}
			}
		}

		for blocks in saves {
			self.notify_save_blocks(&blocks);
		}
		if notify_status {
			self.notify_tx_status();
		}
	}

	// Observed false-positive rate over the download peer's merkle
	// blocks, smoothed with a low pass filter weighted by block size.
	fn track_false_positives(
		&self,
		state: &mut State,
		peer: &Arc<dyn PeerSession>,
		block: &MerkleBlock,
	) {
		if !state.is_download_peer(peer) || block.total_tx == 0 {
			return;
		}

		let false_positives = block
			.tx_hashes
			.iter()
			.filter(|h| self.wallet.tx_for_hash(h).is_none())
			.count();

		state.average_tx_per_block =
			state.average_tx_per_block * 0.999 + f64::from(block.total_tx) * 0.001;
		state.fp_rate = state.fp_rate
			* (1.0 - 0.01 * f64::from(block.total_tx) / state.average_tx_per_block)
			+ 0.01 * false_positives as f64 / state.average_tx_per_block;

		if peer.connect_status() == ConnectStatus::Connected
			&& state.fp_rate > BLOOM_DEFAULT_FALSEPOSITIVE_RATE * 10.0
		{
			warn!(
				"bloom filter false positive rate {} too high after {} blocks, disconnecting {}",
				state.fp_rate,
				state.chain.last_block().height + 1 - state.filter_update_height,
				peer.addr()
			);
			peer.disconnect();
		} else if state.chain.last_block().height + 500 < peer.last_block()
			&& state.fp_rate > BLOOM_REDUCED_FALSEPOSITIVE_RATE * 10.0
		{
			// rebuild the filter before it degrades the whole download
			self.update_filter(state);
		}
	}

	// After syncing, load filters and get mempools from the other peers.
	pub(crate) fn load_mempools(&self, state: &mut State) {
		for session in state.connected_sessions() {
			if !state.is_download_peer(&session)
				|| state.fp_rate > BLOOM_REDUCED_FALSEPOSITIVE_RATE * 5.0
			{
				self.load_bloom_filter(state, &session);
				self.publish_pending_tx(state, &session);
				let mgr = self.myself();
				let p = session.clone();
				session.send_ping(Box::new(move |ok| mgr.load_filter_done(p, ok)));
			} else {
				let known = state.publish.hashes();
				let mgr = self.myself();
				let p = session.clone();
				session.send_mempool(known, Some(Box::new(move |ok| mgr.mempool_done(p, ok))));
			}
		}
	}

	pub(crate) fn load_filter_done(&self, peer: Arc<dyn PeerSession>, success: bool) {
		if success {
			let state = self.state.lock();
			let known = state.publish.hashes();
			drop(state);
			let mgr = self.myself();
			let p = peer.clone();
			peer.send_mempool(known, Some(Box::new(move |ok| mgr.mempool_done(p, ok))));
		} else {
			let mut finished = false;
			{
				let mut state = self.state.lock();
				if state.is_download_peer(&peer) {
					self.sync_stopped(&mut state);
					finished = true;
				}
			}
			if finished {
				if let Some(cb) = &self.callbacks.read().sync_succeeded {
					cb();
				}
			}
		}
	}

	pub(crate) fn mempool_done(&self, peer: Arc<dyn PeerSession>, success: bool) {
		if !success {
			return;
		}

		let mut sync_finished = false;
		{
			let mut state = self.state.lock();
			if state.sync_start_height > 0 {
				sync_finished = true;
				self.sync_stopped(&mut state);
			}
			self.request_unrelayed_tx(&mut state, &peer);
			peer.send_getaddr();
		}

		self.notify_tx_status();
		if sync_finished {
			info!("sync succeeded");
			if let Some(cb) = &self.callbacks.read().sync_succeeded {
				cb();
			}
		}
	}

	// Ask the peer for published transactions it has neither relayed nor
	// been asked about, to learn whether they propagated.
	pub(crate) fn request_unrelayed_tx(&self, state: &mut State, peer: &Arc<dyn PeerSession>) {
		let addr = peer.addr();
		let mut hashes = vec![];

		for hash in state.publish.hashes() {
			if !state.tx_relays.has_peer(&hash, &addr)
				&& !state.tx_requests.has_peer(&hash, &addr)
			{
				hashes.push(hash);
				state.tx_requests.add(hash, addr);
			}
		}

		if !hashes.is_empty() {
			peer.send_getdata(hashes, vec![]);

			let synced = state
				.connected
				.iter()
				.find(|cp| cp.session.addr() == addr)
				.map(|cp| cp.flags.contains(PeerFlags::SYNCED))
				.unwrap_or(false);
			if !synced {
				let mgr = self.myself();
				let p = peer.clone();
				peer.send_ping(Box::new(move |ok| mgr.unrelayed_getdata_done(p, ok)));
			}
		} else if let Some(flags) = state.peer_flags_mut(&addr) {
			flags.insert(PeerFlags::SYNCED);
		}
	}

	// Unconfirmed transactions that aren't in the mempools of any of the
	// connected peers have likely dropped off the network.
	pub(crate) fn unrelayed_getdata_done(&self, peer: Arc<dyn PeerSession>, success: bool) {
		let mut state = self.state.lock();

		if success {
			if let Some(flags) = state.peer_flags_mut(&peer.addr()) {
				flags.insert(PeerFlags::SYNCED);
			}
		}

		// don't remove anything until all connections finished relaying
		// their mempools
		let mut count = 0;
		for cp in &state.connected {
			if cp.session.connect_status() == ConnectStatus::Connected {
				count += 1;
			}
			if !cp.flags.contains(PeerFlags::SYNCED) {
				count = 0;
				break;
			}
		}
		if count < PEER_MAX_CONNECTIONS {
			return;
		}

		for tx in self.wallet.tx_unconfirmed_before(TX_UNCONFIRMED) {
			let publishing = state.publish.is_publishing(&tx.hash);

			if !publishing
				&& state.tx_relays.count(&tx.hash) == 0
				&& state.tx_requests.count(&tx.hash) == 0
			{
				info!("removing tx unconfirmed and not relayed by any peer: {}", tx.hash);
				self.wallet.remove_tx(&tx.hash);
			} else if !publishing && state.tx_relays.count(&tx.hash) < PEER_MAX_CONNECTIONS {
				// mark as unverified
				self.update_tx(&mut state, &[tx.hash], TX_UNCONFIRMED, 0);
			}
		}
	}

	// Confirmed transactions leave the publish table and the relay
	// counts before the wallet hears about the new heights.
	pub(crate) fn update_tx(
		&self,
		state: &mut State,
		tx_hashes: &[Hash],
		height: u32,
		timestamp: u32,
	) {
		if height != TX_UNCONFIRMED {
			for hash in tx_hashes {
				state.publish.remove(hash);
				state.tx_relays.remove_tx(hash);
			}
		}
		self.wallet.update_transactions(tx_hashes, height, timestamp);
	}
}
