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

//! BIP37 bloom filter. Peers apply the filter server-side to decide which
//! transactions and merkle proofs to relay back to us.

use std::cmp;
use std::f64::consts::LN_2;

use byteorder::{ByteOrder, LittleEndian};

use crate::hash::Hash;

/// Filter false positive rate used when the wallet is not expecting any
/// transactions; low enough to keep relayed data small.
pub const BLOOM_REDUCED_FALSEPOSITIVE_RATE: f64 = 0.00005;

/// Target false positive rate once the filter has degraded from address
/// consumption.
pub const BLOOM_DEFAULT_FALSEPOSITIVE_RATE: f64 = 0.0005;

/// Instructs the peer to add both outpoints and pubkeys of matched tx to
/// the filter, so chained spends keep matching.
pub const BLOOM_UPDATE_ALL: u8 = 2;

/// Maximum serialized filter size in bytes, per BIP37.
pub const BLOOM_MAX_FILTER_LENGTH: usize = 36000;

/// Maximum number of hash functions, per BIP37.
pub const BLOOM_MAX_HASH_FUNCS: u32 = 50;

/// A probabilistic set the remote peer matches transactions against.
#[derive(Debug, Clone)]
pub struct BloomFilter {
	data: Vec<u8>,
	hash_funcs: u32,
	tweak: u32,
	flags: u8,
}

impl BloomFilter {
	/// Creates a new filter sized for `elem_count` elements at the given
	/// false positive rate, salted with a per-peer tweak.
	pub fn new(fp_rate: f64, elem_count: usize, tweak: u32, flags: u8) -> BloomFilter {
		let n = cmp::max(elem_count, 1) as f64;
		let size = (-1.0 / (LN_2 * LN_2) * n * fp_rate.ln() / 8.0) as usize;
		let length = cmp::min(cmp::max(size, 1), BLOOM_MAX_FILTER_LENGTH);
		let funcs = (length as f64 * 8.0 / n * LN_2) as u32;

		BloomFilter {
			data: vec![0; length],
			hash_funcs: cmp::min(cmp::max(funcs, 1), BLOOM_MAX_HASH_FUNCS),
			tweak,
			flags,
		}
	}

	fn bit_index(&self, data: &[u8], hash_num: u32) -> usize {
		let seed = hash_num
			.wrapping_mul(0xFBA4_C795)
			.wrapping_add(self.tweak);
		murmur3_32(data, seed) as usize % (self.data.len() * 8)
	}

	/// Adds an element to the filter.
	pub fn insert(&mut self, data: &[u8]) {
		for i in 0..self.hash_funcs {
			let idx = self.bit_index(data, i);
			self.data[idx >> 3] |= 1 << (idx & 7);
		}
	}

	/// Whether the element matches the filter (maybe a false positive).
	pub fn contains(&self, data: &[u8]) -> bool {
		(0..self.hash_funcs).all(|i| {
			let idx = self.bit_index(data, i);
			self.data[idx >> 3] & (1 << (idx & 7)) != 0
		})
	}

	/// Serializes the filter as the payload of a `filterload` message.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.data.len() + 12);
		write_varint(&mut out, self.data.len() as u64);
		out.extend_from_slice(&self.data);
		let mut word = [0u8; 4];
		LittleEndian::write_u32(&mut word, self.hash_funcs);
		out.extend_from_slice(&word);
		LittleEndian::write_u32(&mut word, self.tweak);
		out.extend_from_slice(&word);
		out.push(self.flags);
		out
	}
}

/// Encodes a transaction outpoint the way filter elements expect it:
/// the txid followed by the little-endian output index.
pub fn outpoint_data(tx_hash: &Hash, index: u32) -> Vec<u8> {
	let mut data = Vec::with_capacity(36);
	data.extend_from_slice(tx_hash.as_bytes());
	let mut word = [0u8; 4];
	LittleEndian::write_u32(&mut word, index);
	data.extend_from_slice(&word);
	data
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
	if n < 0xfd {
		out.push(n as u8);
	} else if n <= 0xffff {
		out.push(0xfd);
		let mut word = [0u8; 2];
		LittleEndian::write_u16(&mut word, n as u16);
		out.extend_from_slice(&word);
	} else {
		out.push(0xfe);
		let mut word = [0u8; 4];
		LittleEndian::write_u32(&mut word, n as u32);
		out.extend_from_slice(&word);
	}
}

fn murmur3_32(data: &[u8], seed: u32) -> u32 {
	const C1: u32 = 0xcc9e_2d51;
	const C2: u32 = 0x1b87_3593;

	let mut h = seed;
	let mut chunks = data.chunks_exact(4);

	for chunk in &mut chunks {
		let mut k = LittleEndian::read_u32(chunk);
		k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
		h = (h ^ k).rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
	}

	let rem = chunks.remainder();
	if !rem.is_empty() {
		let mut k: u32 = 0;
		for (i, b) in rem.iter().enumerate() {
			k |= (*b as u32) << (8 * i);
		}
		k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
		h ^= k;
	}

	h ^= data.len() as u32;
	h ^= h >> 16;
	h = h.wrapping_mul(0x85eb_ca6b);
	h ^= h >> 13;
	h = h.wrapping_mul(0xc2b2_ae35);
	h ^ (h >> 16)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn murmur_reference_vectors() {
		// reference vectors from the murmur3 test suite
		assert_eq!(murmur3_32(b"", 0), 0);
		assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
		assert_eq!(murmur3_32(b"hello", 0x9747b28c), 0x24884cba);
		assert_eq!(murmur3_32(b"aaaa", 0x9747b28c), 0x5a97808a);
	}

	#[test]
	fn insert_and_match() {
		let mut filter = BloomFilter::new(0.0005, 10, 12345, BLOOM_UPDATE_ALL);
		let elem = [0x99u8; 20];
		assert!(!filter.contains(&elem));
		filter.insert(&elem);
		assert!(filter.contains(&elem));
		assert!(!filter.contains(&[0x11u8; 20]));
	}

	#[test]
	fn serialization_layout() {
		let mut filter = BloomFilter::new(0.01, 1, 0, BLOOM_UPDATE_ALL);
		filter.insert(b"x");
		let ser = filter.serialize();
		let len = ser[0] as usize;
		// varint length + data + hash funcs + tweak + flags
		assert_eq!(ser.len(), 1 + len + 4 + 4 + 1);
		assert_eq!(*ser.last().unwrap(), BLOOM_UPDATE_ALL);
	}

	#[test]
	fn outpoint_index_is_little_endian() {
		let data = outpoint_data(&Hash([3; 32]), 1);
		assert_eq!(data.len(), 36);
		assert_eq!(&data[32..], &[1, 0, 0, 0]);
	}

	#[test]
	fn size_is_capped() {
		let filter = BloomFilter::new(0.000001, 10_000_000, 0, 0);
		assert!(filter.serialize().len() <= BLOOM_MAX_FILTER_LENGTH + 12);
	}
}
