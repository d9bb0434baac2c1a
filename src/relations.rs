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

//! Multimap from transaction hash to the peers that relayed it (or were
//! asked about it). The manager keeps two instances: `tx_relays` and
//! `tx_requests`.

use std::collections::HashMap;

use litespv_core::Hash;
use litespv_p2p::PeerAddr;

/// Which peers are associated with which transaction hash.
#[derive(Debug, Default)]
pub(crate) struct TxPeerList {
	map: HashMap<Hash, Vec<PeerAddr>>,
}

impl TxPeerList {
	/// Whether the peer is already associated with the hash.
	pub fn has_peer(&self, tx_hash: &Hash, addr: &PeerAddr) -> bool {
		self.map
			.get(tx_hash)
			.map(|peers| peers.contains(addr))
			.unwrap_or(false)
	}

	/// Number of peers associated with the hash.
	pub fn count(&self, tx_hash: &Hash) -> usize {
		self.map.get(tx_hash).map(|peers| peers.len()).unwrap_or(0)
	}

	/// Associates the peer with the hash, returning the new total.
	pub fn add(&mut self, tx_hash: Hash, addr: PeerAddr) -> usize {
		let peers = self.map.entry(tx_hash).or_insert_with(Vec::new);
		if !peers.contains(&addr) {
			peers.push(addr);
		}
		peers.len()
	}

	/// Drops the association, returning whether the peer was present.
	pub fn remove(&mut self, tx_hash: &Hash, addr: &PeerAddr) -> bool {
		if let Some(peers) = self.map.get_mut(tx_hash) {
			if let Some(pos) = peers.iter().position(|p| p == addr) {
				peers.remove(pos);
				return true;
			}
		}
		false
	}

	/// Forgets a transaction entirely.
	pub fn remove_tx(&mut self, tx_hash: &Hash) {
		self.map.remove(tx_hash);
	}

	/// Drops the peer from every transaction's list.
	pub fn remove_peer(&mut self, addr: &PeerAddr) {
		for peers in self.map.values_mut() {
			peers.retain(|p| p != addr);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::net::Ipv4Addr;

	fn addr(host: u8) -> PeerAddr {
		PeerAddr::from_v4(Ipv4Addr::new(10, 0, 0, host), 9333)
	}

	#[test]
	fn add_is_idempotent_per_peer() {
		let mut list = TxPeerList::default();
		let h = Hash([1; 32]);
		assert_eq!(list.add(h, addr(1)), 1);
		assert_eq!(list.add(h, addr(1)), 1);
		assert_eq!(list.add(h, addr(2)), 2);
		assert!(list.has_peer(&h, &addr(1)));
		assert_eq!(list.count(&h), 2);
		assert_eq!(list.count(&Hash([2; 32])), 0);
	}

	#[test]
	fn remove_reports_membership() {
		let mut list = TxPeerList::default();
		let h = Hash([1; 32]);
		list.add(h, addr(1));
		assert!(list.remove(&h, &addr(1)));
		assert!(!list.remove(&h, &addr(1)));
		assert_eq!(list.count(&h), 0);
	}

	#[test]
	fn remove_peer_sweeps_all_hashes() {
		let mut list = TxPeerList::default();
		list.add(Hash([1; 32]), addr(1));
		list.add(Hash([2; 32]), addr(1));
		list.add(Hash([2; 32]), addr(2));
		list.remove_peer(&addr(1));
		assert_eq!(list.count(&Hash([1; 32])), 0);
		assert_eq!(list.count(&Hash([2; 32])), 1);
	}
}
