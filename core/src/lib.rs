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

//! Implementation of the core types and parameters shared by all the crates
//! in the workspace: block hashes, merkle blocks, transactions, the BIP37
//! bloom filter and the compiled-in network parameters.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate serde_derive;

pub mod bloom;
pub mod consensus;
pub mod global;
pub mod hash;

mod block;
mod transaction;

pub use crate::block::{MerkleBlock, UNKNOWN_HEIGHT};
pub use crate::global::{ChainTypes, Checkpoint};
pub use crate::hash::{Hash, ZERO_HASH};
pub use crate::transaction::{Transaction, TxIn, TxOut, TX_UNCONFIRMED};
