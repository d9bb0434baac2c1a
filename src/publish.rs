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

//! Table of locally-originated transactions pending publication. The
//! callback of an entry fires at most once; taking it leaves the entry in
//! place so the tx keeps being announced until it confirms.

use litespv_core::{Hash, Transaction, TX_UNCONFIRMED};

use crate::types::PublishCallback;
use crate::wallet::WalletAdapter;

pub(crate) struct PublishedTx {
	pub tx: Transaction,
	pub callback: Option<PublishCallback>,
}

#[derive(Default)]
pub(crate) struct PublishList {
	entries: Vec<PublishedTx>,
}

impl PublishList {
	/// Adds a transaction along with its unconfirmed input ancestors,
	/// coalescing on the tx hash. A duplicate publish keeps the original
	/// entry (and its callback).
	pub fn add(&mut self, wallet: &dyn WalletAdapter, tx: Transaction, callback: Option<PublishCallback>) {
		if tx.block_height != TX_UNCONFIRMED {
			return;
		}
		if self.contains(&tx.hash) {
			return;
		}

		let inputs: Vec<Hash> = tx.inputs.iter().map(|i| i.prev_hash).collect();
		self.entries.push(PublishedTx { tx, callback });

		// unconfirmed ancestors ride along so peers can validate the chain
		let mut pending = inputs;
		while let Some(hash) = pending.pop() {
			let parent = match wallet.tx_for_hash(&hash) {
				Some(tx) => tx,
				None => continue,
			};
			if parent.block_height != TX_UNCONFIRMED || self.contains(&parent.hash) {
				continue;
			}
			pending.extend(parent.inputs.iter().map(|i| i.prev_hash));
			self.entries.push(PublishedTx {
				tx: parent,
				callback: None,
			});
		}
	}

	pub fn contains(&self, tx_hash: &Hash) -> bool {
		self.entries.iter().any(|e| e.tx.hash == *tx_hash)
	}

	pub fn get(&self, tx_hash: &Hash) -> Option<&PublishedTx> {
		self.entries.iter().find(|e| e.tx.hash == *tx_hash)
	}

	/// Hashes of everything pending, oldest first.
	pub fn hashes(&self) -> Vec<Hash> {
		self.entries.iter().map(|e| e.tx.hash).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether any entry still owes its publisher a callback.
	pub fn has_pending_callbacks(&self) -> bool {
		self.entries.iter().any(|e| e.callback.is_some())
	}

	/// Whether the given tx is being published with a live callback.
	pub fn is_publishing(&self, tx_hash: &Hash) -> bool {
		self.entries
			.iter()
			.any(|e| e.tx.hash == *tx_hash && e.callback.is_some())
	}

	/// Takes the callback for a tx, leaving the entry. Guarantees the
	/// at-most-once discipline.
	pub fn take_callback(&mut self, tx_hash: &Hash) -> Option<PublishCallback> {
		self.entries
			.iter_mut()
			.find(|e| e.tx.hash == *tx_hash)
			.and_then(|e| e.callback.take())
	}

	/// Removes an entry outright, e.g. once the tx confirmed.
	pub fn remove(&mut self, tx_hash: &Hash) -> Option<PublishedTx> {
		let pos = self.entries.iter().position(|e| e.tx.hash == *tx_hash)?;
		Some(self.entries.remove(pos))
	}

	/// Drains every entry that still has a callback, for delivering a
	/// publish failure. Entries without callbacks stay.
	pub fn take_failed(&mut self) -> Vec<PublishCallback> {
		let mut callbacks = vec![];
		let mut i = 0;
		while i < self.entries.len() {
			if self.entries[i].callback.is_some() {
				let entry = self.entries.remove(i);
				callbacks.extend(entry.callback);
			} else {
				i += 1;
			}
		}
		callbacks
	}
}
