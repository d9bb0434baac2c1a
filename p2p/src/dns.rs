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

//! DNS seed resolution. Only IPv4 answers are used for now; they are
//! stored v4-mapped so adding IPv6 later is a resolver change only.

use std::net::{SocketAddr, ToSocketAddrs};

use log::debug;

use crate::peer::PeerAddr;

/// Resolves a seed hostname, returning peer addresses on the given port.
/// Resolution failures are logged and yield an empty list.
pub fn resolve_seed(hostname: &str, port: u16) -> Vec<PeerAddr> {
	debug!("retrieving seed nodes from dns {}", hostname);
	match (hostname, port).to_socket_addrs() {
		Ok(addrs) => addrs
			.filter_map(|addr| match addr {
				SocketAddr::V4(_) => Some(PeerAddr::from_socket_addr(addr)),
				SocketAddr::V6(_) => None,
			})
			.collect(),
		Err(e) => {
			debug!("failed to resolve seed {}: {}", hostname, e);
			vec![]
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bad_hostname_resolves_to_nothing() {
		assert!(resolve_seed("invalid.invalid.", 9333).is_empty());
	}

	#[test]
	fn numeric_host_resolves_v4_only() {
		let addrs = resolve_seed("127.0.0.1", 9333);
		assert_eq!(addrs.len(), 1);
		assert_eq!(format!("{}", addrs[0]), "127.0.0.1:9333");
		assert!(resolve_seed("::1", 9333).is_empty());
	}
}
