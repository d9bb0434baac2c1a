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

//! Peer addresses and the two interfaces that tie a peer session to the
//! manager: `PeerSession` is the outbound message surface implemented by
//! the session, `PeerEvents` is the inbound callback surface implemented
//! by the manager. Sessions run on their own threads; every `PeerEvents`
//! call re-enters the manager through its lock.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use litespv_core::{Hash, MerkleBlock, Transaction};

use crate::types::{ConnectStatus, Error, PeerFlags, Services};

/// Callback invoked when a pong (or a completion signal) comes back from a
/// peer, with `true` on success. Used as the sequencing barrier: a pong
/// guarantees every message sent before the ping has been processed.
pub type PongHandler = Box<dyn FnOnce(bool) + Send>;

/// Network address of a peer. IPv4 addresses are stored v4-mapped so the
/// field is ready for IPv6 without a layout change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
	/// 128-bit address, v4-mapped for IPv4 peers.
	pub ip: [u8; 16],
	/// TCP port.
	pub port: u16,
}

impl PeerAddr {
	/// Builds a v4-mapped peer address.
	pub fn from_v4(ip: Ipv4Addr, port: u16) -> PeerAddr {
		let octets = ip.octets();
		let mut bytes = [0u8; 16];
		bytes[10] = 0xff;
		bytes[11] = 0xff;
		bytes[12..].copy_from_slice(&octets);
		PeerAddr { ip: bytes, port }
	}

	/// Converts from a resolved socket address.
	pub fn from_socket_addr(addr: SocketAddr) -> PeerAddr {
		match addr {
			SocketAddr::V4(v4) => PeerAddr::from_v4(*v4.ip(), v4.port()),
			SocketAddr::V6(v6) => PeerAddr {
				ip: v6.ip().octets(),
				port: v6.port(),
			},
		}
	}

	/// The address as a connectable `SocketAddr`.
	pub fn to_socket_addr(&self) -> SocketAddr {
		let v6 = Ipv6Addr::from(self.ip);
		match v6.to_ipv4() {
			Some(v4) => SocketAddr::new(v4.into(), self.port),
			None => SocketAddr::new(v6.into(), self.port),
		}
	}
}

impl fmt::Display for PeerAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_socket_addr())
	}
}

/// Everything we persist about a known peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeerData {
	/// Network address.
	pub addr: PeerAddr,
	/// Advertised service bits.
	pub services: Services,
	/// Last seen, seconds since the unix epoch.
	pub timestamp: i64,
	/// Session state bits, not meaningful across restarts.
	pub flags: PeerFlags,
}

/// Outbound message surface of a connected peer session. Implementations
/// own the socket, the wire codec and a send queue; all methods enqueue
/// and return without blocking.
pub trait PeerSession: Send + Sync {
	/// Address this session is connected to.
	fn addr(&self) -> PeerAddr;
	/// Connection lifecycle state.
	fn connect_status(&self) -> ConnectStatus;
	/// Protocol version from the peer's version message.
	fn version(&self) -> u32;
	/// Advertised service bits.
	fn services(&self) -> Services;
	/// Chain height the peer reported at handshake, kept current via invs.
	fn last_block(&self) -> u32;
	/// Smoothed ping round-trip time in milliseconds.
	fn ping_time_ms(&self) -> u64;
	/// Fee rate the peer advertised via feefilter, if any.
	fn fee_per_kb(&self) -> u64;

	/// Starts the connection attempt.
	fn connect(&self);
	/// Tears the session down; `peer_disconnected` fires when it is gone.
	fn disconnect(&self);
	/// Arms (or with `None` cancels) a deadline that disconnects the peer
	/// with a timeout error unless rescheduled.
	fn schedule_disconnect(&self, timeout: Option<Duration>);

	/// Tells the session our current chain height for relative-height invs.
	fn set_current_block_height(&self, height: u32);
	/// Lower bound on timestamps worth downloading merkle blocks for.
	fn set_earliest_key_time(&self, timestamp: u32);
	/// Marks the session as having a stale filter; getdata for merkle
	/// blocks is suspended until a fresh `send_filterload`.
	fn set_needs_filter_update(&self, needs: bool);
	/// Re-requests merkle blocks after `from_block`, used after a filter
	/// update invalidated what was in flight.
	fn rerequest_blocks(&self, from_block: Hash);

	/// Sends a getblocks message with the given locators.
	fn send_getblocks(&self, locators: Vec<Hash>, stop: Hash);
	/// Sends a getheaders message with the given locators.
	fn send_getheaders(&self, locators: Vec<Hash>, stop: Hash);
	/// Requests transactions and/or merkle blocks by hash.
	fn send_getdata(&self, tx_hashes: Vec<Hash>, block_hashes: Vec<Hash>);
	/// Requests the peer's mempool, filtering out hashes we already know.
	/// The completion handler runs once the resulting invs are in.
	fn send_mempool(&self, known_tx_hashes: Vec<Hash>, on_done: Option<PongHandler>);
	/// Announces transactions by hash.
	fn send_inv(&self, tx_hashes: Vec<Hash>);
	/// Sends a ping; the handler runs on the matching pong.
	fn send_ping(&self, on_pong: PongHandler);
	/// Loads a serialized bloom filter on the peer.
	fn send_filterload(&self, filter: Vec<u8>);
	/// Asks the peer for addresses of other nodes.
	fn send_getaddr(&self);
}

/// Inbound callback surface the manager hands to every session it builds.
pub trait PeerEvents: Send + Sync {
	/// The session completed its handshake.
	fn peer_connected(&self, peer: &Arc<dyn PeerSession>);
	/// The session is gone; `error` is `None` on a clean local disconnect.
	fn peer_disconnected(&self, peer: &Arc<dyn PeerSession>, error: Option<Error>);
	/// The peer answered getaddr with a list of addresses.
	fn peer_relayed_peers(&self, peer: &Arc<dyn PeerSession>, peers: Vec<PeerData>);
	/// The peer sent a full transaction.
	fn peer_relayed_tx(&self, peer: &Arc<dyn PeerSession>, tx: Transaction);
	/// The peer announced a transaction it has.
	fn peer_has_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash);
	/// The peer rejected a transaction.
	fn peer_rejected_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash, code: u8);
	/// The peer delivered a merkle block.
	fn peer_relayed_block(&self, peer: &Arc<dyn PeerSession>, block: MerkleBlock);
	/// The peer had none of the requested data.
	fn peer_data_not_found(
		&self,
		peer: &Arc<dyn PeerSession>,
		tx_hashes: Vec<Hash>,
		block_hashes: Vec<Hash>,
	);
	/// The peer advertised a minimum fee rate.
	fn peer_set_fee_per_kb(&self, peer: &Arc<dyn PeerSession>, fee_per_kb: u64);
	/// The peer asked for one of our transactions by hash.
	fn peer_requested_tx(&self, peer: &Arc<dyn PeerSession>, tx_hash: Hash)
		-> Option<Transaction>;
	/// Whether the host believes the network is up at all.
	fn network_is_reachable(&self) -> bool;
	/// A session thread is about to exit.
	fn thread_cleanup(&self);
}

/// Builds peer sessions for sampled addresses. The concrete factory owns
/// socket setup and the wire codec; tests substitute fakes.
pub trait PeerFactory: Send + Sync {
	/// Creates a session for `data`, wired to deliver events to `events`.
	/// The session is not connected yet.
	fn build(&self, data: &PeerData, events: Arc<dyn PeerEvents>) -> Arc<dyn PeerSession>;
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn v4_mapping_round_trip() {
		let addr = PeerAddr::from_v4(Ipv4Addr::new(203, 0, 113, 7), 9333);
		assert_eq!(addr.ip[10], 0xff);
		assert_eq!(addr.ip[11], 0xff);
		let sa = addr.to_socket_addr();
		assert_eq!(sa.to_string(), "203.0.113.7:9333");
		assert_eq!(PeerAddr::from_socket_addr(sa), addr);
	}

	#[test]
	fn display_is_host_port() {
		let addr = PeerAddr::from_v4(Ipv4Addr::new(10, 0, 0, 1), 19335);
		assert_eq!(format!("{}", addr), "10.0.0.1:19335");
	}
}
