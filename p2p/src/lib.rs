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

//! Networking primitives for the peer manager: the directory of known peer
//! addresses, DNS seed discovery and the interfaces a peer session exposes
//! to (and expects from) the rest of the system. The wire codec itself
//! lives behind the `PeerSession` trait.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate serde_derive;

pub mod dns;
mod peer;
mod registry;
mod types;

pub use crate::peer::{PeerAddr, PeerData, PeerEvents, PeerFactory, PeerSession, PongHandler};
pub use crate::registry::PeerRegistry;
pub use crate::types::{ConnectStatus, Error, P2PConfig, PeerFlags, Services};
pub use crate::types::{PEER_MAX_CONNECTIONS, REJECT_SPENT};
