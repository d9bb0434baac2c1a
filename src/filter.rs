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

//! Bloom filter controller: builds the filter from wallet state and runs
//! the ping-barrier update protocol. While `bloom_filter` is `None` an
//! update is in flight and inbound merkle blocks are discarded, so a
//! half-filtered block can never enter the chain.

use std::sync::Arc;

use litespv_core::bloom::{outpoint_data, BloomFilter, BLOOM_UPDATE_ALL};
use litespv_core::bloom::BLOOM_REDUCED_FALSEPOSITIVE_RATE;
use litespv_core::consensus::{EXTERNAL_GAP_LIMIT, INTERNAL_GAP_LIMIT};
use litespv_core::ZERO_HASH;
use litespv_p2p::{PeerAddr, PeerFlags, PeerSession};

use crate::manager::{PeerManager, State};

impl PeerManager {
	/// Builds a fresh filter from the wallet and loads it on the peer.
	pub(crate) fn load_bloom_filter(&self, state: &mut State, peer: &Arc<dyn PeerSession>) {
		// every new wallet address forces a filter rebuild and each
		// address is single-use, so pre-generate spares to keep the chain
		// sync from rebuilding the filter on every found transaction
		self.wallet.unused_addrs(EXTERNAL_GAP_LIMIT + 100, false);
		self.wallet.unused_addrs(INTERNAL_GAP_LIMIT + 100, true);

		// parked orphans may have been matched against the old filter
		state.chain.clear_orphans();
		state.filter_update_height = state.chain.last_block().height;
		state.fp_rate = BLOOM_REDUCED_FALSEPOSITIVE_RATE;

		let addrs = self.wallet.all_addrs();
		let utxos = self.wallet.utxos();
		let height = state.chain.last_block().height;
		let cutoff = if height > 100 { height - 100 } else { 0 };
		let recent_txs = self.wallet.tx_unconfirmed_before(cutoff);

		// the tx count stands in for the number of spent outputs, so the
		// size estimate can run slightly small
		let elements = addrs.len() + utxos.len() + recent_txs.len() + 100;
		let mut filter = BloomFilter::new(
			state.fp_rate,
			elements,
			peer_tweak(&peer.addr()),
			BLOOM_UPDATE_ALL,
		);

		// addresses catch tx paying the wallet
		for addr in addrs {
			if let Some(hash) = self.wallet.address_hash160(&addr) {
				if !filter.contains(&hash) {
					filter.insert(&hash);
				}
			}
		}

		// utxos catch tx spending from the wallet
		for utxo in utxos {
			let outpoint = outpoint_data(&utxo.tx_hash, utxo.index);
			if !filter.contains(&outpoint) {
				filter.insert(&outpoint);
			}
		}

		// outputs spent within the last 100 blocks still matter in case
		// those spends get reorged out
		for tx in recent_txs {
			for input in &tx.inputs {
				let parent = match self.wallet.tx_for_hash(&input.prev_hash) {
					Some(p) => p,
					None => continue,
				};
				let ours = parent
					.outputs
					.get(input.prev_index as usize)
					.and_then(|o| o.address.as_ref())
					.map(|a| self.wallet.contains_address(a))
					.unwrap_or(false);
				if ours {
					let outpoint = outpoint_data(&input.prev_hash, input.prev_index);
					if !filter.contains(&outpoint) {
						filter.insert(&outpoint);
					}
				}
			}
		}

		debug!(
			"loading bloom filter with {} elements on {}",
			elements,
			peer.addr()
		);
		let data = filter.serialize();
		state.bloom_filter = Some(filter);
		peer.send_filterload(data);
	}

	/// After a relayed wallet tx consumed addresses, make sure the next
	/// gap-limit of unused addresses is still covered by the filter; if
	/// not, drop it to force a rebuild.
	pub(crate) fn check_filter_coverage(&self, state: &mut State) {
		let mut stale = false;
		if let Some(filter) = &state.bloom_filter {
			let mut addrs = self.wallet.unused_addrs(EXTERNAL_GAP_LIMIT, false);
			addrs.extend(self.wallet.unused_addrs(INTERNAL_GAP_LIMIT, true));
			for addr in addrs {
				let hash = match self.wallet.address_hash160(&addr) {
					Some(h) => h,
					None => continue,
				};
				if !filter.contains(&hash) {
					stale = true;
					break;
				}
			}
		}

		if stale {
			debug!("filter no longer covers the address gap, rebuilding");
			state.bloom_filter = None;
			self.update_filter(state);
		}
	}

	/// Starts the filter-update ping barrier on the download peer. The
	/// pong guarantees any tx the peer already sent is in flight before
	/// the new filter is computed.
	pub(crate) fn update_filter(&self, state: &mut State) {
		let dp = match state.download_peer.clone() {
			Some(p) => p,
			None => return,
		};
		let addr = dp.addr();

		match state.peer_flags_mut(&addr) {
			Some(flags) => {
				if flags.contains(PeerFlags::NEEDS_FILTER_UPDATE) {
					return;
				}
				flags.insert(PeerFlags::NEEDS_FILTER_UPDATE);
			}
			None => return,
		}

		dp.set_needs_filter_update(true);
		debug!("{} filter update needed, waiting for pong", addr);

		let mgr = self.myself();
		let p = dp.clone();
		dp.send_ping(Box::new(move |ok| {
			if ok {
				mgr.update_filter_ping_done(p);
			}
		}));
	}

	pub(crate) fn update_filter_ping_done(&self, _peer: Arc<dyn PeerSession>) {
		debug!("updating filter with newly created wallet addresses");
		let mut state = self.state.lock();
		state.bloom_filter = None;

		if state.is_syncing() {
			// mid-sync only the download peer needs the fresh filter
			if let Some(dp) = state.download_peer.clone() {
				self.load_bloom_filter(&mut state, &dp);
				let mgr = self.myself();
				let p = dp.clone();
				// wait for a pong so the filter is loaded before blocks
				// are re-requested
				dp.send_ping(Box::new(move |ok| {
					if ok {
						mgr.update_filter_load_done(p);
					}
				}));
			}
		} else {
			for session in state.connected_sessions() {
				self.load_bloom_filter(&mut state, &session);
				let mgr = self.myself();
				let p = session.clone();
				session.send_ping(Box::new(move |ok| {
					if ok {
						mgr.update_filter_load_done(p);
					}
				}));
			}
		}
	}

	pub(crate) fn update_filter_load_done(&self, peer: Arc<dyn PeerSession>) {
		let mut state = self.state.lock();
		peer.set_needs_filter_update(false);
		if let Some(flags) = state.peer_flags_mut(&peer.addr()) {
			flags.remove(PeerFlags::NEEDS_FILTER_UPDATE);
		}

		if state.is_syncing() {
			// blocks delivered against the stale filter have to be
			// downloaded again
			if let Some(dp) = state.download_peer.clone() {
				dp.rerequest_blocks(state.chain.last_block().block_hash);
				let mgr = self.myself();
				let p = dp.clone();
				dp.send_ping(Box::new(move |ok| {
					if ok {
						mgr.update_filter_rerequest_done(p);
					}
				}));
			}
		} else {
			peer.send_mempool(vec![], None);
		}
	}

	pub(crate) fn update_filter_rerequest_done(&self, peer: Arc<dyn PeerSession>) {
		let mut state = self.state.lock();
		let pending_update = state
			.peer_flags_mut(&peer.addr())
			.map(|f| f.contains(PeerFlags::NEEDS_FILTER_UPDATE))
			.unwrap_or(false);

		if !pending_update {
			let locators = state.chain.block_locators();
			peer.send_getblocks(locators, ZERO_HASH);
		}
	}
}

// Per-peer filter nonce so peers cannot compare filters to fingerprint
// the wallet. FNV-1a over the address bytes.
fn peer_tweak(addr: &PeerAddr) -> u32 {
	let mut hash: u32 = 0x811c_9dc5;
	for b in addr.ip.iter() {
		hash ^= u32::from(*b);
		hash = hash.wrapping_mul(0x0100_0193);
	}
	hash ^= u32::from(addr.port & 0xff);
	hash = hash.wrapping_mul(0x0100_0193);
	hash ^= u32::from(addr.port >> 8);
	hash.wrapping_mul(0x0100_0193)
}
