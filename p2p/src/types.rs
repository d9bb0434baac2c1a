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

use std::fmt;

use litespv_core::global::ChainTypes;

/// Number of simultaneous peer connections the manager maintains.
pub const PEER_MAX_CONNECTIONS: usize = 3;

/// Reject message code for a transaction conflicting with a spent input.
/// Any other rejection of a wallet-sent tx marks the peer as misconfigured.
pub const REJECT_SPENT: u8 = 0x12;

/// Errors surfaced by peer sessions and to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// The peer violated the protocol.
	Protocol,
	/// A scheduled deadline elapsed without progress.
	TimedOut,
	/// No viable peer connections exist.
	NotConnected,
	/// The host reported the network as down.
	NetworkUnreachable,
	/// A transaction was unsigned or locally rejected.
	Invalid,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Protocol => write!(f, "peer protocol violation"),
			Error::TimedOut => write!(f, "peer timed out"),
			Error::NotConnected => write!(f, "not connected to the network"),
			Error::NetworkUnreachable => write!(f, "network unreachable"),
			Error::Invalid => write!(f, "invalid transaction"),
		}
	}
}

impl std::error::Error for Error {}

bitflags! {
	/// Service bits a peer advertises in its version message.
	#[derive(Serialize, Deserialize)]
	pub struct Services: u64 {
		/// No known services.
		const NONE = 0;
		/// Node can serve full blocks.
		const NODE_NETWORK = 1;
		/// Node supports BIP37 bloom filtering.
		const NODE_BLOOM = 1 << 2;
	}
}

bitflags! {
	/// Per-session state bits the manager keeps on a peer.
	#[derive(Serialize, Deserialize)]
	pub struct PeerFlags: u8 {
		/// The peer has finished relaying its mempool.
		const SYNCED = 0x01;
		/// A bloom filter update is in flight on this peer.
		const NEEDS_FILTER_UPDATE = 0x02;
	}
}

/// Connection lifecycle of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
	/// No connection.
	Disconnected,
	/// TCP/handshake in progress.
	Connecting,
	/// Handshake complete, session live.
	Connected,
}

/// Configuration for the peer-to-peer layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct P2PConfig {
	/// Which network to run against.
	pub chain_type: ChainTypes,
	/// Override of the network's standard port, mostly for tests.
	pub port: Option<u16>,
}

impl Default for P2PConfig {
	fn default() -> P2PConfig {
		P2PConfig {
			chain_type: ChainTypes::Mainnet,
			port: None,
		}
	}
}

impl P2PConfig {
	/// Port peers are contacted on.
	pub fn peer_port(&self) -> u16 {
		self.port.unwrap_or_else(|| self.chain_type.standard_port())
	}
}
