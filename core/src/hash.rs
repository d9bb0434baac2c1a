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

//! Hash type used to identify blocks and transactions.
//!
//! The 32 bytes are kept in wire order internally; hex strings are read and
//! written in the reversed display order conventional for Bitcoin-family
//! chains, so `Hash::from_hex` of a block explorer string round-trips
//! through `Display`.

use std::fmt;

use litespv_util as util;

/// A hash to uniquely (or close enough) identify one of the main blockchain
/// constructs. Used pervasively for blocks and transactions.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash(pub [u8; 32]);

/// The hash of all zeroes, used as a stop hash and as a sentinel.
pub const ZERO_HASH: Hash = Hash([0; 32]);

impl Hash {
	/// Builds a hash from a display-order hex string (as printed by block
	/// explorers), reversing into wire order.
	pub fn from_hex(hex: &str) -> Result<Hash, String> {
		let mut bytes =
			util::from_hex(hex).map_err(|e| format!("invalid hex string: {:?}", e))?;
		if bytes.len() != 32 {
			return Err(format!("invalid hash length {}", bytes.len()));
		}
		bytes.reverse();
		let mut a = [0; 32];
		a.copy_from_slice(&bytes);
		Ok(Hash(a))
	}

	/// Whether this is the all-zero hash.
	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|b| *b == 0)
	}

	/// Converts the hash to a byte vector in wire order.
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// The hash bytes in wire order.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for b in self.0.iter().rev() {
			write!(f, "{:02x}", b)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hex_round_trip() {
		let s = "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2";
		let h = Hash::from_hex(s).unwrap();
		assert_eq!(format!("{}", h), s);
		// wire order is reversed
		assert_eq!(h.0[31], 0x12);
		assert_eq!(h.0[0], 0xe2);
	}

	#[test]
	fn rejects_bad_input() {
		assert!(Hash::from_hex("abcd").is_err());
		assert!(Hash::from_hex("zz").is_err());
		assert!(ZERO_HASH.is_zero());
	}
}
