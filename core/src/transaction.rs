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

//! Transaction type as seen by the peer manager. Script execution and
//! signing belong to the wallet; the manager only needs the input/output
//! graph and the confirmation metadata.

use crate::hash::Hash;

/// Block height of a transaction that is not confirmed in any block.
pub const TX_UNCONFIRMED: u32 = u32::max_value();

/// A transaction input, spending an output of a previous transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxIn {
	/// Hash of the transaction whose output is being spent.
	pub prev_hash: Hash,
	/// Index of the spent output within that transaction.
	pub prev_index: u32,
	/// Signature script; empty until signed.
	pub signature: Vec<u8>,
}

/// A transaction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOut {
	/// Amount in the smallest unit.
	pub amount: u64,
	/// Destination address, when the script pays to a standard one.
	pub address: Option<String>,
}

/// A wallet-relevant transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
	/// Transaction hash.
	pub hash: Hash,
	/// Inputs.
	pub inputs: Vec<TxIn>,
	/// Outputs.
	pub outputs: Vec<TxOut>,
	/// Height of the confirming block, or `TX_UNCONFIRMED`.
	pub block_height: u32,
	/// When the tx was first seen or confirmed; zero marks it unverified.
	pub timestamp: u32,
}

impl Transaction {
	/// True once every input carries a signature script.
	pub fn is_signed(&self) -> bool {
		!self.inputs.is_empty() && self.inputs.iter().all(|i| !i.signature.is_empty())
	}
}

impl PartialEq for Transaction {
	fn eq(&self, other: &Transaction) -> bool {
		self.hash == other.hash
	}
}

impl Eq for Transaction {}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn signed_requires_all_inputs() {
		let mut tx = Transaction {
			hash: Hash([7; 32]),
			inputs: vec![
				TxIn {
					prev_hash: Hash([1; 32]),
					prev_index: 0,
					signature: vec![0xaa],
				},
				TxIn {
					prev_hash: Hash([2; 32]),
					prev_index: 1,
					signature: vec![],
				},
			],
			outputs: vec![],
			block_height: TX_UNCONFIRMED,
			timestamp: 0,
		};
		assert!(!tx.is_signed());
		tx.inputs[1].signature = vec![0xbb];
		assert!(tx.is_signed());
	}
}
