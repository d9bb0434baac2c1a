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

//! Transaction publishing and the tx-related peer events: relays,
//! announcements, rejections and getdata requests.

use std::sync::Arc;

use chrono::Utc;

use litespv_core::{Hash, Transaction, TX_UNCONFIRMED};
use litespv_p2p::{Error, PeerSession, PEER_MAX_CONNECTIONS, REJECT_SPENT};

use crate::manager::{PeerManager, State, MAX_CONNECT_FAILURES, PROTOCOL_TIMEOUT};
use crate::types::PublishCallback;

impl PeerManager {
	/// Publishes a signed transaction to the network. The callback fires
	/// exactly once: with `None` once a peer relays or requests the tx,
	/// or with the failure.
	pub fn publish_tx(&self, tx: Transaction, callback: PublishCallback) {
		debug!("publishing tx {}", tx.hash);

		if !tx.is_signed() {
			callback(Some(Error::Invalid));
			return;
		}

		let mut state = self.state.lock();
		if !state.is_connected {
			let failures = state.connect_failure_count;
			drop(state);
			if failures >= MAX_CONNECT_FAILURES || !self.reachable() {
				callback(Some(Error::NotConnected));
				return;
			}
			state = self.state.lock();
		}

		let mut tx = tx;
		tx.timestamp = Utc::now().timestamp() as u32;
		state.publish.add(&*self.wallet, tx, Some(callback));
		debug!("{} tx on the publish list", state.publish.len());

		let sessions = state.connected_sessions();
		let connected_count = sessions.len();
		for session in sessions {
			// leave the download peer out to see whether the tx
			// propagates back to it on its own, unless it is the only
			// connection we have
			if !state.is_download_peer(&session) || connected_count == 1 {
				self.publish_pending_tx(&mut state, &session);
				let mgr = self.myself();
				let p = session.clone();
				session.send_ping(Box::new(move |ok| mgr.publish_inv_done(p, ok)));
			}
		}
	}

	/// Announces everything on the publish list to the peer, arming the
	/// publish timeout while callbacks are outstanding.
	pub(crate) fn publish_pending_tx(&self, state: &mut State, peer: &Arc<dyn PeerSession>) {
		if state.publish.has_pending_callbacks() {
			peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
		}
		peer.send_inv(state.publish.hashes());
	}

	pub(crate) fn publish_inv_done(&self, peer: Arc<dyn PeerSession>, _success: bool) {
		let mut state = self.state.lock();
		self.request_unrelayed_tx(&mut state, &peer);
	}

	pub(crate) fn handle_relayed_tx(&self, peer: &Arc<dyn PeerSession>, tx: Transaction) {
		let addr = peer.addr();
		let hash = tx.hash;
		let now = Utc::now().timestamp() as u32;
		debug!("{} relayed tx {}", addr, hash);

		let callback;
		{
			let mut state = self.state.lock();
			let is_syncing = state.is_syncing();

			let mut relay_count = 0;
			callback = if state.publish.contains(&hash) {
				relay_count = state.tx_relays.add(hash, addr);
				state.publish.take_callback(&hash)
			} else {
				None
			};

			// cancel the publish timeout once no callbacks are pending,
			// unless the download peer still owes sync progress
			if !state.publish.has_pending_callbacks()
				&& (!is_syncing || !state.is_download_peer(peer))
			{
				peer.schedule_disconnect(None);
			}

			let mut known_tx: Option<Transaction>;
			let mut is_wallet_tx = false;
			if !is_syncing || self.wallet.contains_tx(&tx) {
				is_wallet_tx = self.wallet.register_tx(&tx);
				known_tx = Some(tx);
				if is_wallet_tx {
					if let Some(wtx) = self.wallet.tx_for_hash(&hash) {
						known_tx = Some(wtx);
					}
				}
			} else {
				known_tx = None;
			}

			if is_wallet_tx {
				if let Some(ref wtx) = known_tx {
					if is_syncing && state.is_download_peer(peer) {
						peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
					}

					if self.wallet.amount_sent_by_tx(wtx) > 0 && self.wallet.tx_is_valid(wtx) {
						// keep announcing a valid send until it confirms
						let pending = wtx.clone();
						state.publish.add(&*self.wallet, pending, None);
					}

					// relay tracking indicates how likely the tx is to
					// confirm; only meaningful once syncing is done
					if !is_syncing {
						relay_count = state.tx_relays.add(hash, addr);
					}

					state.tx_requests.remove(&hash, &addr);
					self.check_filter_coverage(&mut state);
				}
			}

			if let Some(ref wtx) = known_tx {
				if relay_count >= PEER_MAX_CONNECTIONS
					&& wtx.block_height == TX_UNCONFIRMED
					&& wtx.timestamp == 0
				{
					// enough of the network has it, mark it verified
					self.update_tx(&mut state, &[hash], TX_UNCONFIRMED, now);
				}
			}
		}

		if let Some(cb) = callback {
			cb(None);
		}
	}

	pub(crate) fn handle_has_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash) {
		let addr = peer.addr();
		let now = Utc::now().timestamp() as u32;
		debug!("{} has tx {}", addr, tx_hash);

		let callback;
		{
			let mut state = self.state.lock();
			let is_syncing = state.is_syncing();
			let mut tx = self.wallet.tx_for_hash(&tx_hash);

			let mut relay_count = 0;
			callback = if state.publish.contains(&tx_hash) {
				if tx.is_none() {
					tx = state.publish.get(&tx_hash).map(|e| e.tx.clone());
				}
				relay_count = state.tx_relays.add(tx_hash, addr);
				state.publish.take_callback(&tx_hash)
			} else {
				None
			};

			if !state.publish.has_pending_callbacks()
				&& (!is_syncing || !state.is_download_peer(peer))
			{
				peer.schedule_disconnect(None);
			}

			if let Some(t) = tx {
				let is_wallet_tx = self.wallet.register_tx(&t);

				if is_syncing && state.is_download_peer(peer) && is_wallet_tx {
					peer.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
				}

				if !is_syncing {
					relay_count = state.tx_relays.add(tx_hash, addr);
				}

				let current = self.wallet.tx_for_hash(&tx_hash).unwrap_or(t);
				if relay_count >= PEER_MAX_CONNECTIONS
					&& current.block_height == TX_UNCONFIRMED
					&& current.timestamp == 0
				{
					self.update_tx(&mut state, &[tx_hash], TX_UNCONFIRMED, now);
				}

				state.tx_requests.remove(&tx_hash, &addr);
			}
		}

		if let Some(cb) = callback {
			cb(None);
		}
	}

	pub(crate) fn handle_rejected_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash, code: u8) {
		let addr = peer.addr();
		warn!("{} rejected tx {}, code {:#04x}", addr, tx_hash, code);

		{
			let mut state = self.state.lock();
			state.tx_requests.remove(&tx_hash, &addr);

			if let Some(tx) = self.wallet.tx_for_hash(&tx_hash) {
				if state.tx_relays.remove(&tx_hash, &addr) && tx.block_height == TX_UNCONFIRMED {
					// a retraction demotes the tx back to unverified
					self.update_tx(&mut state, &[tx_hash], TX_UNCONFIRMED, 0);
				}

				// rejected for something other than a double-spend: the
				// peer is misconfigured, as long as every known input is
				// confirmed
				if code != REJECT_SPENT && self.wallet.amount_sent_by_tx(&tx) > 0 {
					let mut inputs_confirmed = true;
					for input in &tx.inputs {
						if let Some(parent) = self.wallet.tx_for_hash(&input.prev_hash) {
							if parent.block_height == TX_UNCONFIRMED {
								inputs_confirmed = false;
								break;
							}
						}
					}
					if inputs_confirmed {
						self.peer_misbehavin(&mut state, peer);
					}
				}
			}
		}

		self.notify_tx_status();
	}

	pub(crate) fn handle_requested_tx(
		&self,
		peer: &Arc<dyn PeerSession>,
		tx_hash: Hash,
	) -> Option<Transaction> {
		let addr = peer.addr();
		debug!("{} requested tx {}", addr, tx_hash);

		let callback;
		let mut error = None;
		let mut tx;
		{
			let mut state = self.state.lock();
			let is_syncing = state.is_syncing();

			tx = state.publish.get(&tx_hash).map(|e| e.tx.clone());
			callback = state.publish.take_callback(&tx_hash);

			if let Some(ref t) = tx {
				if !self.wallet.tx_is_valid(t) {
					error = Some(Error::Invalid);
					state.publish.remove(&tx_hash);
				}
			}

			if !state.publish.has_pending_callbacks()
				&& (!is_syncing || !state.is_download_peer(peer))
			{
				peer.schedule_disconnect(None);
			}

			if error.is_none() {
				if let Some(ref t) = tx {
					state.tx_relays.add(tx_hash, addr);
					self.wallet.register_tx(t);
				}
			} else {
				tx = None;
			}
		}

		if let Some(cb) = callback {
			cb(error);
		}
		tx
	}
}
