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

//! The wallet interface the manager drives. The wallet is internally
//! synchronized; the manager may call it with its own lock held but never
//! forwards user callbacks while doing so.

use litespv_core::{Hash, Transaction};

/// An unspent wallet output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utxo {
	/// Transaction the output belongs to.
	pub tx_hash: Hash,
	/// Output index inside that transaction.
	pub index: u32,
}

/// Interface into the wallet for addresses, UTXOs and tx bookkeeping.
pub trait WalletAdapter: Send + Sync {
	/// The next `count` unused addresses on the external or internal
	/// chain, generating new ones as needed to maintain the gap limit.
	fn unused_addrs(&self, count: u32, internal: bool) -> Vec<String>;
	/// Every address the wallet has ever generated.
	fn all_addrs(&self) -> Vec<String>;
	/// Current unspent outputs.
	fn utxos(&self) -> Vec<Utxo>;
	/// Transactions that are unconfirmed, or confirmed at or above the
	/// given height.
	fn tx_unconfirmed_before(&self, height: u32) -> Vec<Transaction>;
	/// Registers a relayed transaction; true when it is wallet-relevant
	/// and was accepted.
	fn register_tx(&self, tx: &Transaction) -> bool;
	/// Removes a transaction and any transactions depending on it.
	fn remove_tx(&self, tx_hash: &Hash);
	/// Looks up a wallet transaction.
	fn tx_for_hash(&self, tx_hash: &Hash) -> Option<Transaction>;
	/// Batch-updates heights and timestamps for the given transactions.
	fn update_transactions(&self, tx_hashes: &[Hash], height: u32, timestamp: u32);
	/// Marks every transaction confirmed above `height` as unconfirmed,
	/// used when a reorg rewinds the chain.
	fn set_tx_unconfirmed_after(&self, height: u32);
	/// Current fee rate per 1000 bytes.
	fn fee_per_kb(&self) -> u64;
	/// Sets the fee rate per 1000 bytes.
	fn set_fee_per_kb(&self, fee_per_kb: u64);
	/// Whether the address belongs to the wallet.
	fn contains_address(&self, addr: &str) -> bool;
	/// HASH160 of the address payload, `None` for unparsable addresses.
	fn address_hash160(&self, addr: &str) -> Option<[u8; 20]>;
	/// Total amount the transaction spends out of the wallet.
	fn amount_sent_by_tx(&self, tx: &Transaction) -> u64;
	/// Whether the transaction is valid from the wallet's point of view.
	fn tx_is_valid(&self, tx: &Transaction) -> bool;
	/// Whether the transaction is relevant to the wallet.
	fn contains_tx(&self, tx: &Transaction) -> bool;
}
