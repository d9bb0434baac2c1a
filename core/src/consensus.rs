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

//! All the consensus constants the manager relies on and the difficulty
//! retarget verification. Values are the Litecoin network parameters.

use num_bigint::BigUint;

use crate::block::MerkleBlock;

/// Number of blocks between difficulty recomputations.
pub const DIFFICULTY_INTERVAL: u32 = 2016;

/// One week in seconds, the horizon used for orphan staleness, header
/// relevance and checkpoint selection relative to the wallet birthday.
pub const WEEK_SECS: i64 = 7 * 24 * 60 * 60;

/// Expected wall-clock duration of a full retarget interval (3.5 days).
pub const TARGET_TIMESPAN: u32 = 3 * 24 * 60 * 60 + 12 * 60 * 60;

/// Expected block spacing.
pub const TARGET_SPACING: u32 = 150;

/// The easiest allowed difficulty target, in compact form.
pub const MAX_PROOF_OF_WORK: u32 = 0x1e0f_fff0;

/// Default wallet fee rate in smallest units per 1000 bytes.
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;

/// Upper bound the fee floor logic will never raise the wallet fee above.
pub const MAX_FEE_PER_KB: u64 = 1_000_000;

/// Number of unused receive addresses kept ahead of the last used one.
pub const EXTERNAL_GAP_LIMIT: u32 = 10;

/// Number of unused change addresses kept ahead of the last used one.
pub const INTERNAL_GAP_LIMIT: u32 = 5;

/// Verifies the difficulty target of `block` against its parent. On a
/// retarget boundary `transition_time` must be the timestamp of the block
/// that started the ending interval; elsewhere the target simply carries
/// over from the parent.
pub fn verify_difficulty(block: &MerkleBlock, prev: &MerkleBlock, transition_time: u32) -> bool {
	if block.prev_block != prev.block_hash {
		return false;
	}

	if prev.height != crate::block::UNKNOWN_HEIGHT
		&& (prev.height + 1) % DIFFICULTY_INTERVAL == 0
	{
		if transition_time == 0 {
			return false;
		}

		// limit the adjustment to a factor of 4 either way
		let mut timespan = i64::from(prev.timestamp) - i64::from(transition_time);
		if timespan > i64::from(TARGET_TIMESPAN) * 4 {
			timespan = i64::from(TARGET_TIMESPAN) * 4;
		}
		if timespan < i64::from(TARGET_TIMESPAN) / 4 {
			timespan = i64::from(TARGET_TIMESPAN) / 4;
		}

		let mut target = expand_target(prev.difficulty_target);
		target = target * BigUint::from(timespan as u64) / BigUint::from(TARGET_TIMESPAN);

		let max = expand_target(MAX_PROOF_OF_WORK);
		if target > max {
			target = max;
		}

		block.difficulty_target == compact_from_target(&target)
	} else {
		block.difficulty_target == prev.difficulty_target
	}
}

/// Expands a compact difficulty representation into the full 256-bit target.
pub fn expand_target(compact: u32) -> BigUint {
	let size = (compact >> 24) as usize;
	let word = compact & 0x007f_ffff;
	if size <= 3 {
		BigUint::from(word >> (8 * (3 - size)))
	} else {
		BigUint::from(word) << (8 * (size - 3))
	}
}

/// Compacts a 256-bit target back into its 4-byte representation.
pub fn compact_from_target(target: &BigUint) -> u32 {
	let bytes = target.to_bytes_be();
	let mut size = bytes.len();
	let mut compact: u32 = match size {
		0 => 0,
		1 => u32::from(bytes[0]) << 16,
		2 => u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8,
		_ => u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]),
	};
	// the compact mantissa is signed, shift out a set high bit
	if compact & 0x0080_0000 != 0 {
		compact >>= 8;
		size += 1;
	}
	compact | ((size as u32) << 24)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::hash::{Hash, ZERO_HASH};

	fn block(height: u32, timestamp: u32, target: u32, prev: &MerkleBlock) -> MerkleBlock {
		MerkleBlock {
			block_hash: Hash([(height % 251) as u8; 32]),
			prev_block: prev.block_hash,
			timestamp,
			difficulty_target: target,
			total_tx: 1,
			tx_hashes: vec![],
			height,
		}
	}

	fn genesis_like(height: u32, timestamp: u32, target: u32) -> MerkleBlock {
		MerkleBlock {
			block_hash: Hash([0xaa; 32]),
			prev_block: ZERO_HASH,
			timestamp,
			difficulty_target: target,
			total_tx: 1,
			tx_hashes: vec![],
			height,
		}
	}

	#[test]
	fn compact_round_trip() {
		for compact in &[0x1e0f_fff0u32, 0x1d00_ffff, 0x1b01_2345, 0x1c0a_01e5] {
			let expanded = expand_target(*compact);
			assert_eq!(compact_from_target(&expanded), *compact);
		}
	}

	#[test]
	fn carry_over_target_off_boundary() {
		let prev = genesis_like(10, 1000, 0x1d00_ffff);
		let good = block(11, 1150, 0x1d00_ffff, &prev);
		let bad = block(11, 1150, 0x1d00_fffe, &prev);
		assert!(verify_difficulty(&good, &prev, 0));
		assert!(!verify_difficulty(&bad, &prev, 0));
	}

	#[test]
	fn retarget_on_exact_timespan_keeps_target() {
		// interval ran for exactly the target timespan, so the computed
		// target equals the previous one
		let transition_time = 1_000_000;
		let prev = genesis_like(
			DIFFICULTY_INTERVAL - 1,
			transition_time + TARGET_TIMESPAN,
			0x1d00_ffff,
		);
		let good = block(DIFFICULTY_INTERVAL, 0, 0x1d00_ffff, &prev);
		let bad = block(DIFFICULTY_INTERVAL, 0, 0x1d00_fff0, &prev);
		assert!(verify_difficulty(&good, &prev, transition_time));
		assert!(!verify_difficulty(&bad, &prev, transition_time));
	}

	#[test]
	fn retarget_adjustment_is_clamped() {
		// an absurdly slow interval only loosens the target by 4x
		let transition_time = 1_000_000;
		let prev = genesis_like(
			DIFFICULTY_INTERVAL - 1,
			transition_time + TARGET_TIMESPAN * 100,
			0x1c00_ffff,
		);
		let expected = compact_from_target(
			&(expand_target(0x1c00_ffff) * BigUint::from(4u32)),
		);
		let good = block(DIFFICULTY_INTERVAL, 0, expected, &prev);
		assert!(verify_difficulty(&good, &prev, transition_time));
	}

	#[test]
	fn retarget_never_exceeds_pow_limit() {
		let transition_time = 1_000_000;
		let prev = genesis_like(
			DIFFICULTY_INTERVAL - 1,
			transition_time + TARGET_TIMESPAN * 4,
			MAX_PROOF_OF_WORK,
		);
		let good = block(DIFFICULTY_INTERVAL, 0, MAX_PROOF_OF_WORK, &prev);
		assert!(verify_difficulty(&good, &prev, transition_time));
	}

	#[test]
	fn missing_transition_time_rejects() {
		let prev = genesis_like(DIFFICULTY_INTERVAL - 1, 1_000_000, 0x1d00_ffff);
		let b = block(DIFFICULTY_INTERVAL, 0, 0x1d00_ffff, &prev);
		assert!(!verify_difficulty(&b, &prev, 0));
	}
}
