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

//! The peer manager singleton: connection lifecycle, download-peer
//! election, peer discovery and the callback surface peer sessions call
//! into. All mutable state sits behind one mutex; user-facing callbacks
//! and network waits happen outside it.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rand::{thread_rng, Rng};

use litespv_chain::Chain;
use litespv_core::bloom::BloomFilter;
use litespv_core::consensus::WEEK_SECS;
use litespv_core::{consensus, Hash, MerkleBlock, Transaction, ZERO_HASH};
use litespv_p2p::{dns, ConnectStatus, Error, P2PConfig, PeerAddr, PeerData, PeerEvents};
use litespv_p2p::{PeerFactory, PeerFlags, PeerRegistry, PeerSession, Services};
use litespv_p2p::PEER_MAX_CONNECTIONS;
use litespv_util::{Mutex, RwLock};

use crate::publish::PublishList;
use crate::relations::TxPeerList;
use crate::types::Callbacks;
use crate::wallet::WalletAdapter;

/// Deadline for a peer to make sync or publish progress before it is
/// disconnected with a timeout.
pub const PROTOCOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Consecutive connection failures after which syncing stops and the host
/// is told the network is down.
pub const MAX_CONNECT_FAILURES: u32 = 20;

pub(crate) struct ConnectedPeer {
	pub session: Arc<dyn PeerSession>,
	pub flags: PeerFlags,
}

pub(crate) struct State {
	pub registry: PeerRegistry,
	pub connected: Vec<ConnectedPeer>,
	pub chain: Chain,
	pub tx_relays: TxPeerList,
	pub tx_requests: TxPeerList,
	pub publish: PublishList,
	pub bloom_filter: Option<BloomFilter>,
	pub download_peer: Option<Arc<dyn PeerSession>>,
	pub is_connected: bool,
	pub connect_failure_count: u32,
	pub misbehavin_count: u32,
	pub dns_thread_count: u32,
	pub estimated_height: u32,
	pub sync_start_height: u32,
	pub filter_update_height: u32,
	pub fp_rate: f64,
	pub average_tx_per_block: f64,
}

impl State {
	/// Chain download still has ground to cover.
	pub fn is_syncing(&self) -> bool {
		self.chain.last_block().height < self.estimated_height
	}

	pub fn is_download_peer(&self, peer: &Arc<dyn PeerSession>) -> bool {
		match &self.download_peer {
			Some(dp) => dp.addr() == peer.addr(),
			None => false,
		}
	}

	/// Sessions that completed their handshake.
	pub fn connected_sessions(&self) -> Vec<Arc<dyn PeerSession>> {
		self.connected
			.iter()
			.filter(|cp| cp.session.connect_status() == ConnectStatus::Connected)
			.map(|cp| cp.session.clone())
			.collect()
	}

	pub fn peer_flags_mut(&mut self, addr: &PeerAddr) -> Option<&mut PeerFlags> {
		self.connected
			.iter_mut()
			.find(|cp| cp.session.addr() == *addr)
			.map(|cp| &mut cp.flags)
	}
}

/// Coordinates a fleet of peer sessions: discovery, chain download,
/// bloom filter upkeep and transaction publishing.
pub struct PeerManager {
	pub(crate) config: P2PConfig,
	pub(crate) wallet: Arc<dyn WalletAdapter>,
	factory: Arc<dyn PeerFactory>,
	pub(crate) earliest_key_time: u32,
	pub(crate) callbacks: RwLock<Callbacks>,
	pub(crate) state: Mutex<State>,
	self_ref: RwLock<Weak<PeerManager>>,
}

impl PeerManager {
	/// Builds a manager from persisted state. `blocks` and `peers` are
	/// whatever the host saved on the previous run.
	pub fn new(
		config: P2PConfig,
		wallet: Arc<dyn WalletAdapter>,
		factory: Arc<dyn PeerFactory>,
		earliest_key_time: u32,
		blocks: Vec<MerkleBlock>,
		peers: Vec<PeerData>,
	) -> Result<Arc<PeerManager>, litespv_chain::Error> {
		PeerManager::with_difficulty_verifier(
			config,
			wallet,
			factory,
			earliest_key_time,
			blocks,
			peers,
			consensus::verify_difficulty,
		)
	}

	/// Same as `new` but with a custom difficulty verifier, for networks
	/// with different retarget rules and for tests.
	pub fn with_difficulty_verifier(
		config: P2PConfig,
		wallet: Arc<dyn WalletAdapter>,
		factory: Arc<dyn PeerFactory>,
		earliest_key_time: u32,
		blocks: Vec<MerkleBlock>,
		peers: Vec<PeerData>,
		verifier: litespv_chain::DifficultyVerifier,
	) -> Result<Arc<PeerManager>, litespv_chain::Error> {
		let chain = Chain::new(config.chain_type, earliest_key_time, blocks, verifier)?;

		let manager = Arc::new(PeerManager {
			config,
			wallet,
			factory,
			earliest_key_time,
			callbacks: RwLock::new(Callbacks::default()),
			state: Mutex::new(State {
				registry: PeerRegistry::new(peers),
				connected: vec![],
				chain,
				tx_relays: TxPeerList::default(),
				tx_requests: TxPeerList::default(),
				publish: PublishList::default(),
				bloom_filter: None,
				download_peer: None,
				is_connected: false,
				connect_failure_count: 0,
				misbehavin_count: 0,
				dns_thread_count: 0,
				estimated_height: 0,
				sync_start_height: 0,
				filter_update_height: 0,
				fp_rate: 0.0,
				average_tx_per_block: 1400.0,
			}),
			self_ref: RwLock::new(Weak::new()),
		});
		*manager.self_ref.write() = Arc::downgrade(&manager);
		Ok(manager)
	}

	pub(crate) fn myself(&self) -> Arc<PeerManager> {
		self.self_ref.read().upgrade().expect("manager gone")
	}

	/// Registers the host callbacks. Not thread-safe, call once before
	/// `connect`.
	pub fn set_callbacks(&self, callbacks: Callbacks) {
		*self.callbacks.write() = callbacks;
	}

	/// Connects to the peer-to-peer network. Also the manual retry entry
	/// point after a `NotConnected` failure.
	pub fn connect(&self) {
		let mut fire_sync_started = false;
		let mut fire_sync_failed = false;
		{
			let mut state = self.state.lock();
			if state.connect_failure_count >= MAX_CONNECT_FAILURES {
				// this is a manual retry
				state.connect_failure_count = 0;
			}

			if (state.download_peer.is_none() || state.is_syncing())
				&& state.sync_start_height == 0
			{
				state.sync_start_height = state.chain.last_block().height + 1;
				fire_sync_started = true;
			}

			for cp in &state.connected {
				if cp.session.connect_status() == ConnectStatus::Connecting {
					cp.session.connect();
				}
			}

			let now = Utc::now().timestamp();
			let needs_discovery = state.connected.len() < PEER_MAX_CONNECTIONS
				&& state.registry.is_stale(PEER_MAX_CONNECTIONS, now);
			drop(state);

			if needs_discovery {
				self.discover();
			}

			let mut state = self.state.lock();
			if state.connected.len() < PEER_MAX_CONNECTIONS {
				for data in state.registry.sample_for_connect(100) {
					if state.connected.len() >= PEER_MAX_CONNECTIONS {
						break;
					}
					if state.connected.iter().any(|cp| cp.session.addr() == data.addr) {
						continue;
					}
					let events: Arc<dyn PeerEvents> = self.myself();
					let session = self.factory.build(&data, events);
					session.set_earliest_key_time(self.earliest_key_time);
					state.connected.push(ConnectedPeer {
						session: session.clone(),
						flags: PeerFlags::empty(),
					});
					debug!("connecting to {}", data.addr);
					session.connect();
				}
			}

			if state.connected.is_empty() {
				self.sync_stopped(&mut state);
				fire_sync_failed = true;
			}
		}

		if fire_sync_started {
			if let Some(cb) = &self.callbacks.read().sync_started {
				cb();
			}
		}
		if fire_sync_failed {
			if let Some(cb) = &self.callbacks.read().sync_failed {
				cb(Error::NetworkUnreachable);
			}
		}
	}

	/// Disconnects every peer and blocks until sessions and discovery
	/// threads have drained.
	pub fn disconnect(&self) {
		{
			let mut state = self.state.lock();
			// prevent further automatic reconnect attempts
			state.connect_failure_count = MAX_CONNECT_FAILURES;
			for cp in &state.connected {
				cp.session.disconnect();
			}
		}

		loop {
			{
				let state = self.state.lock();
				if state.connected.is_empty() && state.dns_thread_count == 0 {
					break;
				}
			}
			thread::yield_now();
		}
	}

	/// Rescans blocks and transactions after `earliest_key_time`. A new
	/// random download peer is selected, since a malicious node might
	/// have lied by omitting matching transactions.
	pub fn rescan(&self) {
		let mut reconnect = false;
		{
			let mut state = self.state.lock();
			if state.is_connected {
				if let Err(e) = state.chain.rewind_to_checkpoint(self.earliest_key_time) {
					error!("rescan could not rewind: {}", e);
				}
				if let Some(dp) = state.download_peer.clone() {
					state.registry.remove(&dp.addr());
					dp.disconnect();
				}
				state.sync_start_height = 0;
				reconnect = true;
			}
		}
		if reconnect {
			self.connect();
		}
	}

	/// True while connected to at least one peer.
	pub fn is_connected(&self) -> bool {
		self.state.lock().is_connected
	}

	/// Number of peers with a completed handshake.
	pub fn peer_count(&self) -> usize {
		self.state.lock().connected_sessions().len()
	}

	/// Height of the verified chain tip.
	pub fn last_block_height(&self) -> u32 {
		self.state.lock().chain.last_block().height
	}

	/// Timestamp of the verified chain tip.
	pub fn last_block_timestamp(&self) -> u32 {
		self.state.lock().chain.last_block().timestamp
	}

	/// Best block height reported by connected peers (unverified).
	pub fn estimated_block_height(&self) -> u32 {
		let state = self.state.lock();
		let height = state.chain.last_block().height;
		if height < state.estimated_height {
			state.estimated_height
		} else {
			height
		}
	}

	/// Sync progress in [0, 1]. `start_height` is the height the current
	/// sync began at; pass 0 to use the manager's own record.
	pub fn sync_progress(&self, start_height: u32) -> f64 {
		let state = self.state.lock();
		let start = if start_height == 0 {
			state.sync_start_height
		} else {
			start_height
		};
		let height = state.chain.last_block().height;

		if state.download_peer.is_none() && state.sync_start_height == 0 {
			0.0
		} else if state.download_peer.is_none() || height < state.estimated_height {
			if height > start && state.estimated_height > start {
				0.1 + 0.9 * f64::from(height - start)
					/ f64::from(state.estimated_height - start)
			} else {
				0.05
			}
		} else {
			1.0
		}
	}

	/// Number of connected peers that have relayed the given tx.
	pub fn relay_count(&self, tx_hash: &Hash) -> usize {
		self.state.lock().tx_relays.count(tx_hash)
	}

	/// host:port of the current download peer, empty when none.
	pub fn download_peer_name(&self) -> String {
		match &self.state.lock().download_peer {
			Some(dp) => format!("{}", dp.addr()),
			None => String::new(),
		}
	}

	// DNS peer discovery. The first seed resolves on the caller, the rest
	// on detached threads; the caller waits, yielding, until resolution
	// produced enough addresses or every thread finished.
	fn discover(&self) {
		let services = Services::NODE_NETWORK | Services::NODE_BLOOM;
		let seeds = self.config.chain_type.dns_seeds();
		let port = self.config.peer_port();

		for seed in seeds.iter().skip(1) {
			let mgr = self.myself();
			let host: &'static str = *seed;
			{
				self.state.lock().dns_thread_count += 1;
			}
			let spawned = thread::Builder::new()
				.name("dns_seed".to_string())
				.spawn(move || {
					let addrs = dns::resolve_seed(host, port);
					let now = Utc::now().timestamp();
					{
						let mut state = mgr.state.lock();
						for addr in addrs {
							// age the address so unvetted peers don't win
							// sampling over ones we have actually used
							let age: i64 =
								24 * 60 * 60 + thread_rng().gen_range(0i64, 2 * 24 * 60 * 60);
							state.registry.add(PeerData {
								addr,
								services,
								timestamp: now - age,
								flags: PeerFlags::empty(),
							});
						}
						state.dns_thread_count -= 1;
					}
					mgr.notify_thread_cleanup();
				});
			if spawned.is_err() {
				self.state.lock().dns_thread_count -= 1;
			}
		}

		let now = Utc::now().timestamp();
		let addrs = dns::resolve_seed(seeds[0], port);
		{
			let mut state = self.state.lock();
			for addr in addrs {
				state.registry.add(PeerData {
					addr,
					services,
					timestamp: now,
					flags: PeerFlags::empty(),
				});
			}
		}

		loop {
			{
				let state = self.state.lock();
				if state.dns_thread_count == 0
					|| state.registry.len() >= PEER_MAX_CONNECTIONS
				{
					break;
				}
			}
			thread::yield_now();
		}
	}

	// A peer that violates the protocol is evicted from the registry and
	// disconnected; after 10 cumulative offenders the registry is cleared
	// so the next connect reseeds from DNS.
	pub(crate) fn peer_misbehavin(&self, state: &mut State, peer: &Arc<dyn PeerSession>) {
		state.registry.remove(&peer.addr());
		state.misbehavin_count += 1;
		if state.misbehavin_count >= 10 {
			state.misbehavin_count = 0;
			state.registry.clear();
		}
		peer.disconnect();
	}

	pub(crate) fn sync_stopped(&self, state: &mut State) {
		state.sync_start_height = 0;

		if let Some(dp) = state.download_peer.clone() {
			// don't cancel the timeout while a tx publish is pending on it
			if state.publish.has_pending_callbacks() {
				return;
			}
			dp.schedule_disconnect(None);
		}
	}

	pub(crate) fn notify_tx_status(&self) {
		if let Some(cb) = &self.callbacks.read().tx_status_update {
			cb();
		}
	}

	pub(crate) fn notify_save_blocks(&self, blocks: &[MerkleBlock]) {
		if let Some(cb) = &self.callbacks.read().save_blocks {
			cb(blocks);
		}
	}

	pub(crate) fn notify_save_peers(&self, peers: &[PeerData]) {
		if let Some(cb) = &self.callbacks.read().save_peers {
			cb(peers);
		}
	}

	pub(crate) fn notify_thread_cleanup(&self) {
		if let Some(cb) = &self.callbacks.read().thread_cleanup {
			cb();
		}
	}

	pub(crate) fn reachable(&self) -> bool {
		self.callbacks
			.read()
			.network_is_reachable
			.as_ref()
			.map(|f| f())
			.unwrap_or(true)
	}
}

impl PeerEvents for PeerManager {
	fn peer_connected(&self, peer: &Arc<dyn PeerSession>) {
		let now = Utc::now().timestamp();
		let mut state = self.state.lock();
		debug!("{} connected, last block {}", peer.addr(), peer.last_block());
		state.registry.touch(&peer.addr(), now);

		let our_height = state.chain.last_block().height;

		// drop peers that can't serve full blocks or are far behind us
		if !peer.services().contains(Services::NODE_NETWORK)
			|| peer.last_block() + 10 < our_height
		{
			peer.disconnect();
			return;
		}

		// drop peers that don't support SPV filtering
		if peer.version() >= 70011 && !peer.services().contains(Services::NODE_BLOOM) {
			peer.disconnect();
			return;
		}

		let keep_current = match &state.download_peer {
			Some(dp) => dp.last_block() >= peer.last_block() || our_height >= peer.last_block(),
			None => false,
		};

		if keep_current {
			if our_height >= peer.last_block() {
				// already synced: put the new peer to work right away
				state.connect_failure_count = 0;
				self.load_bloom_filter(&mut state, peer);
				self.publish_pending_tx(&mut state, peer);
				let mgr = self.myself();
				let p = peer.clone();
				peer.send_ping(Box::new(move |ok| mgr.load_filter_done(p, ok)));
			}
			return;
		}

		// elect the download peer: lowest ping among the best-height peers
		let mut best = peer.clone();
		for cp in &state.connected {
			let p = &cp.session;
			if p.connect_status() != ConnectStatus::Connected {
				continue;
			}
			if (p.ping_time_ms() < best.ping_time_ms() && p.last_block() >= best.last_block())
				|| p.last_block() > best.last_block()
			{
				best = p.clone();
			}
		}

		if let Some(old) = state.download_peer.take() {
			old.disconnect();
		}

		info!("selected {} as download peer", best.addr());
		state.download_peer = Some(best.clone());
		state.is_connected = true;
		state.estimated_height = best.last_block();
		self.load_bloom_filter(&mut state, &best);
		best.set_current_block_height(our_height);
		self.publish_pending_tx(&mut state, &best);

		if our_height < best.last_block() {
			// start the chain download; the failure count is not reset
			// yet in case this request times out
			best.schedule_disconnect(Some(PROTOCOL_TIMEOUT));
			let locators = state.chain.block_locators();

			// headers only up to a week before the earliest key, merkle
			// blocks from there on
			if i64::from(state.chain.last_block().timestamp) + WEEK_SECS
				>= i64::from(self.earliest_key_time)
			{
				best.send_getblocks(locators, ZERO_HASH);
			} else {
				best.send_getheaders(locators, ZERO_HASH);
			}
		} else {
			state.connect_failure_count = 0;
			self.load_mempools(&mut state);
		}
	}

	fn peer_disconnected(&self, peer: &Arc<dyn PeerSession>, error: Option<Error>) {
		let addr = peer.addr();
		info!("{} disconnected: {:?}", addr, error);

		let mut tx_error = None;
		let mut will_save = false;
		let mut will_reconnect = false;
		let failed_callbacks;
		{
			let mut state = self.state.lock();

			match error {
				Some(Error::Protocol) => {
					// the peer isn't following standard policy
					self.peer_misbehavin(&mut state, peer);
				}
				Some(err) => {
					state.registry.remove(&addr);
					state.connect_failure_count += 1;

					// a timeout with a pending publish means the publish
					// itself timed out
					let is_syncing = state.is_syncing();
					if err == Error::TimedOut
						&& (!state.is_download_peer(peer)
							|| !is_syncing || state.connected.len() == 1)
					{
						tx_error = Some(Error::TimedOut);
					}
				}
				None => {}
			}

			state.tx_relays.remove_peer(&addr);

			if state.is_download_peer(peer) {
				state.is_connected = false;
				state.download_peer = None;
				if state.connect_failure_count > MAX_CONNECT_FAILURES {
					state.connect_failure_count = MAX_CONNECT_FAILURES;
				}
			}

			if !state.is_connected && state.connect_failure_count == MAX_CONNECT_FAILURES {
				self.sync_stopped(&mut state);
				// clear the registry so the next connect reseeds from DNS
				state.registry.clear();
				tx_error = Some(Error::NotConnected);
				will_save = true;
			} else if state.connect_failure_count < MAX_CONNECT_FAILURES {
				will_reconnect = true;
			}

			failed_callbacks = if tx_error.is_some() {
				state.publish.take_failed()
			} else {
				vec![]
			};

			state.connected.retain(|cp| cp.session.addr() != addr);
		}

		for cb in failed_callbacks {
			cb(tx_error);
		}
		if will_save {
			self.notify_save_peers(&[]);
			if let Some(cb) = &self.callbacks.read().sync_failed {
				cb(error.unwrap_or(Error::NotConnected));
			}
		}
		if will_reconnect {
			self.connect();
		}
		self.notify_tx_status();
	}

	fn peer_relayed_peers(&self, peer: &Arc<dyn PeerSession>, peers: Vec<PeerData>) {
		let now = Utc::now().timestamp();
		debug!("{} relayed {} peer(s)", peer.addr(), peers.len());

		let snapshot = {
			let mut state = self.state.lock();
			state.registry.add_relayed(peers, now);
			state.registry.as_slice().to_vec()
		};

		// peer relaying is complete when we receive < 1000
		if snapshot.len() > 1 && snapshot.len() < 1000 {
			self.notify_save_peers(&snapshot);
		}
	}

	fn peer_relayed_tx(&self, peer: &Arc<dyn PeerSession>, tx: Transaction) {
		self.handle_relayed_tx(peer, tx);
	}

	fn peer_has_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash) {
		self.handle_has_tx(peer, tx_hash);
	}

	fn peer_rejected_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash, code: u8) {
		self.handle_rejected_tx(peer, tx_hash, code);
	}

	fn peer_relayed_block(&self, peer: &Arc<dyn PeerSession>, block: MerkleBlock) {
		self.handle_relayed_block(peer, block);
	}

	fn peer_data_not_found(
		&self,
		peer: &Arc<dyn PeerSession>,
		tx_hashes: Vec<Hash>,
		_block_hashes: Vec<Hash>,
	) {
		let addr = peer.addr();
		let mut state = self.state.lock();
		for hash in &tx_hashes {
			state.tx_relays.remove(hash, &addr);
			state.tx_requests.remove(hash, &addr);
		}
	}

	fn peer_set_fee_per_kb(&self, _peer: &Arc<dyn PeerSession>, _fee_per_kb: u64) {
		let state = self.state.lock();

		// second-highest advertised rate, so one adversarial peer cannot
		// inflate the floor
		let mut max_fee = 0u64;
		let mut second_fee = 0u64;
		for session in state.connected_sessions() {
			let fee = session.fee_per_kb();
			if fee > max_fee {
				second_fee = max_fee;
				max_fee = fee;
			} else if fee > second_fee {
				second_fee = fee;
			}
		}
		drop(state);

		let raised = second_fee * 3 / 2;
		if raised > consensus::DEFAULT_FEE_PER_KB
			&& raised <= consensus::MAX_FEE_PER_KB
			&& raised > self.wallet.fee_per_kb()
		{
			info!("increasing fee per kb to {} based on peer feefilters", raised);
			self.wallet.set_fee_per_kb(raised);
		}
	}

	fn peer_requested_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash) -> Option<Transaction> {
		self.handle_requested_tx(peer, tx_hash)
	}

	fn network_is_reachable(&self) -> bool {
		self.reachable()
	}

	fn thread_cleanup(&self) {
		self.notify_thread_cleanup();
	}
}
