// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2024-2026 Livelink Systems. All rights reserved.
//  https://livelink.systems
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Transport and channel layer for [Livelink](https://livelink.systems).
//!
//! The `livelink-network` crate provides the managed connection primitive used by the
//! Livelink client: a [`Channel`](crate::channel::Channel) maintains at most one live
//! transport connection to a single logical endpoint, transparently reconnecting with
//! exponential backoff when the transport fails, and surfacing connectivity as an
//! observable [`ChannelState`](crate::state::ChannelState) rather than as errors.
//!
//! Two transports are supported behind one interface, selected by the endpoint URL
//! scheme at open time:
//!
//! - `ws`/`wss`: a WebSocket connection via tokio-tungstenite.
//! - `http`/`https`: a long-poll loop via reqwest, for environments where sockets
//!   are unavailable.
//!
//! Inbound payloads are decoded into [`Envelope`](crate::types::Envelope) values
//! before reaching any caller; malformed payloads are dropped and logged, never
//! surfaced. Outbound sends are fire-and-forget and report delivery eligibility as a
//! boolean, since message loss while reconnecting is an expected condition.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod channel;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

mod transport;

pub use channel::Channel;
pub use config::ChannelConfig;
pub use error::NetworkError;
pub use state::ChannelState;
pub use types::{Envelope, MessageHandler, channel_message_handler};
