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

//! The block store and the chain acceptance engine: classifies every
//! arriving merkle block, extends the chain, detects and executes reorgs
//! and resolves orphans. The engine is a plain state machine; network
//! effects and wallet mutations it wants are returned to the caller as
//! data.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

mod chain;
mod error;
mod store;
mod types;

pub use crate::chain::{Chain, DifficultyVerifier};
pub use crate::error::{Error, ErrorKind};
pub use crate::store::BlockStore;
pub use crate::types::{BlockContext, BlockStatus, ProcessResult, WalletOp};
