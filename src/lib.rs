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

//! SPV peer manager for the Litecoin network. Maintains a pool of peer
//! connections, downloads and verifies the merkle block chain, keeps the
//! peers' bloom filters aligned with the wallet and publishes wallet
//! transactions, tracking their propagation.
//!
//! The manager is a single shared object behind one coarse lock. Peer
//! sessions run on their own threads and call back in through the
//! `PeerEvents` trait; the lock is never held across network waits, which
//! are sequenced with ping barriers instead.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate log;

mod filter;
mod manager;
mod publish;
mod relations;
mod sync;
mod txs;
mod types;
mod wallet;

pub use crate::manager::{PeerManager, MAX_CONNECT_FAILURES, PROTOCOL_TIMEOUT};
pub use crate::types::{Callbacks, PublishCallback};
pub use crate::wallet::{Utxo, WalletAdapter};

pub use litespv_chain as chain;
pub use litespv_core as core;
pub use litespv_p2p as p2p;
pub use litespv_util as util;
