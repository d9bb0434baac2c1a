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

//! Directory of known peer addresses, ordered most-recently-seen first.

use rand::{thread_rng, Rng};

use crate::peer::{PeerAddr, PeerData};

/// Hard cap on the number of addresses kept.
const MAX_PEERS: usize = 2500;

/// Pruning only shrinks the directory below this size on age grounds.
const PRUNE_FLOOR: usize = 1000;

/// Age beyond which a tail entry is expendable.
const PRUNE_AGE_SECS: i64 = 3 * 60 * 60;

/// Known peer addresses with timestamps, sorted by timestamp descending so
/// sampling can bias toward recently seen peers by index alone.
#[derive(Debug, Default)]
pub struct PeerRegistry {
	peers: Vec<PeerData>,
}

impl PeerRegistry {
	/// Builds a registry from persisted peer data.
	pub fn new(peers: Vec<PeerData>) -> PeerRegistry {
		let mut registry = PeerRegistry { peers };
		registry.sort();
		registry
	}

	fn sort(&mut self) {
		self.peers.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
	}

	/// Number of known addresses.
	pub fn len(&self) -> usize {
		self.peers.len()
	}

	/// Whether no addresses are known.
	pub fn is_empty(&self) -> bool {
		self.peers.is_empty()
	}

	/// All entries, most recent first.
	pub fn as_slice(&self) -> &[PeerData] {
		&self.peers
	}

	/// Adds a single address, keeping the ordering.
	pub fn add(&mut self, peer: PeerData) {
		self.peers.push(peer);
		self.sort();
	}

	/// Folds a batch of relayed addresses in, then applies the size cap and
	/// the age-based tail prune.
	pub fn add_relayed(&mut self, incoming: Vec<PeerData>, now: i64) {
		self.peers.extend(incoming);
		self.sort();
		self.prune(now);
	}

	/// Caps the directory at `MAX_PEERS` and drops tail entries older than
	/// three hours while more than `PRUNE_FLOOR` remain.
	pub fn prune(&mut self, now: i64) {
		self.peers.truncate(MAX_PEERS);
		while self.peers.len() > PRUNE_FLOOR {
			match self.peers.last() {
				Some(last) if last.timestamp + PRUNE_AGE_SECS < now => {
					self.peers.pop();
				}
				_ => break,
			}
		}
	}

	/// Removes every entry with the given address.
	pub fn remove(&mut self, addr: &PeerAddr) {
		self.peers.retain(|p| p.addr != *addr);
	}

	/// Refreshes an entry's last-seen timestamp, e.g. on a successful
	/// handshake.
	pub fn touch(&mut self, addr: &PeerAddr, now: i64) {
		let mut touched = false;
		for p in self.peers.iter_mut() {
			if p.addr == *addr {
				p.timestamp = now;
				touched = true;
			}
		}
		if touched {
			self.sort();
		}
	}

	/// Drops all known addresses, forcing DNS re-seeding on next connect.
	pub fn clear(&mut self) {
		self.peers.clear();
	}

	/// Whether the pool is too thin or too old to connect from, meaning
	/// discovery should run first.
	pub fn is_stale(&self, want: usize, now: i64) -> bool {
		if self.peers.len() < want {
			return true;
		}
		self.peers[want - 1].timestamp + 3 * 24 * 60 * 60 < now
	}

	/// Draws up to `k` connection candidates. Candidates come from the 100
	/// most recently seen entries, in a random order biased toward the
	/// front by remapping a uniform index i to i*i/n.
	pub fn sample_for_connect(&self, k: usize) -> Vec<PeerData> {
		let mut candidates: Vec<PeerData> =
			self.peers.iter().take(100).cloned().collect();
		let mut picked = Vec::with_capacity(k.min(candidates.len()));
		let mut rng = thread_rng();

		while !candidates.is_empty() && picked.len() < k {
			let n = candidates.len();
			let i = rng.gen_range(0, n);
			let i = i * i / n;
			picked.push(candidates.remove(i));
		}
		picked
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::types::{PeerFlags, Services};
	use std::net::Ipv4Addr;

	fn peer(host: u8, timestamp: i64) -> PeerData {
		PeerData {
			addr: PeerAddr::from_v4(Ipv4Addr::new(10, 0, 0, host), 9333),
			services: Services::NODE_NETWORK | Services::NODE_BLOOM,
			timestamp,
			flags: PeerFlags::empty(),
		}
	}

	fn bulk(count: usize, timestamp: i64) -> Vec<PeerData> {
		(0..count)
			.map(|i| PeerData {
				addr: PeerAddr::from_v4(
					Ipv4Addr::new(10, (i >> 8) as u8, (i & 0xff) as u8, 1),
					9333,
				),
				services: Services::NODE_NETWORK,
				timestamp,
				flags: PeerFlags::empty(),
			})
			.collect()
	}

	#[test]
	fn sorted_most_recent_first() {
		let registry = PeerRegistry::new(vec![peer(1, 100), peer(2, 300), peer(3, 200)]);
		let stamps: Vec<i64> = registry.as_slice().iter().map(|p| p.timestamp).collect();
		assert_eq!(stamps, vec![300, 200, 100]);
	}

	#[test]
	fn caps_at_2500() {
		let mut registry = PeerRegistry::default();
		registry.add_relayed(bulk(3000, 1_000_000), 1_000_000);
		assert_eq!(registry.len(), 2500);
	}

	#[test]
	fn prunes_old_tail_down_to_floor() {
		let now = 1_000_000;
		let mut registry = PeerRegistry::default();
		// 1200 fresh, 800 stale; stale sort to the tail and all 800 get
		// pruned since the pool stays above the floor until then
		let mut peers = bulk(1200, now);
		peers.extend(bulk(800, now - PRUNE_AGE_SECS - 1).into_iter().map(|mut p| {
			p.addr.port = 9334;
			p
		}));
		registry.add_relayed(peers, now);
		assert_eq!(registry.len(), 1200);
	}

	#[test]
	fn keeps_old_tail_below_floor() {
		let now = 1_000_000;
		let mut registry = PeerRegistry::default();
		registry.add_relayed(bulk(900, now - PRUNE_AGE_SECS - 1), now);
		assert_eq!(registry.len(), 900);
	}

	#[test]
	fn stale_when_thin_or_old() {
		let now = 1_000_000;
		let empty = PeerRegistry::default();
		assert!(empty.is_stale(3, now));

		let fresh = PeerRegistry::new(vec![peer(1, now), peer(2, now), peer(3, now)]);
		assert!(!fresh.is_stale(3, now));

		let old = PeerRegistry::new(vec![
			peer(1, now),
			peer(2, now),
			peer(3, now - 4 * 24 * 60 * 60),
		]);
		assert!(old.is_stale(3, now));
	}

	#[test]
	fn sampling_prefers_recent_peers() {
		let peers: Vec<PeerData> = (0i64..100).map(|i| peer((i % 250) as u8, 1000 - i)).collect();
		let registry = PeerRegistry::new(peers);

		// with the quadratic bias, the front half should dominate draws
		let mut front = 0;
		for _ in 0..200 {
			let sample = registry.sample_for_connect(1);
			let ts = sample[0].timestamp;
			if ts > 950 {
				front += 1;
			}
		}
		assert!(front > 100, "front draws: {}", front);
	}

	#[test]
	fn sample_is_bounded_and_unique() {
		let registry = PeerRegistry::new(vec![peer(1, 1), peer(2, 2), peer(3, 3)]);
		let sample = registry.sample_for_connect(10);
		assert_eq!(sample.len(), 3);
		let mut addrs: Vec<_> = sample.iter().map(|p| p.addr).collect();
		addrs.dedup();
		assert_eq!(addrs.len(), 3);
	}

	#[test]
	fn remove_and_clear() {
		let mut registry = PeerRegistry::new(vec![peer(1, 1), peer(2, 2)]);
		let gone = registry.as_slice()[0].addr;
		registry.remove(&gone);
		assert_eq!(registry.len(), 1);
		registry.clear();
		assert!(registry.is_empty());
	}
}
