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

//! Host-facing callback types.

use litespv_core::MerkleBlock;
use litespv_p2p::{Error, PeerData};

/// Fires exactly once per publish attempt: `None` on success, the error
/// otherwise.
pub type PublishCallback = Box<dyn FnOnce(Option<Error>) + Send>;

/// Callbacks into the host application. Set them once via
/// `PeerManager::set_callbacks` before calling `connect`.
///
/// Save semantics: a single-element slice adds to what the host already
/// persisted; an empty or multi-element slice replaces it.
#[derive(Default)]
pub struct Callbacks {
	/// Blockchain syncing started.
	pub sync_started: Option<Box<dyn Fn() + Send + Sync>>,
	/// Blockchain syncing completed successfully.
	pub sync_succeeded: Option<Box<dyn Fn() + Send + Sync>>,
	/// Blockchain syncing failed.
	pub sync_failed: Option<Box<dyn Fn(Error) + Send + Sync>>,
	/// Transaction status may have changed, e.g. a new block arrived.
	pub tx_status_update: Option<Box<dyn Fn() + Send + Sync>>,
	/// Blocks should be written to the persistent store.
	pub save_blocks: Option<Box<dyn Fn(&[MerkleBlock]) + Send + Sync>>,
	/// Peers should be written to the persistent store.
	pub save_peers: Option<Box<dyn Fn(&[PeerData]) + Send + Sync>>,
	/// Must return true while networking is available.
	pub network_is_reachable: Option<Box<dyn Fn() -> bool + Send + Sync>>,
	/// A manager-owned thread is about to terminate.
	pub thread_cleanup: Option<Box<dyn Fn() + Send + Sync>>,
}
