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

//! Topic subscription registry and live view handles for [Livelink](https://livelink.systems).
//!
//! The `livelink-client` crate sits on top of `livelink-network` and multiplexes any
//! number of subscribers onto at most one channel per topic key:
//!
//! - [`TopicRegistry`](crate::registry::TopicRegistry) owns the topic table, opens a
//!   channel when a topic gains its first subscriber, fans inbound messages out to
//!   every subscriber with panic isolation, and tears the channel down only after
//!   the last subscriber has been gone for a grace period.
//! - [`Subscription`](crate::subscription::Subscription) is the RAII handle for one
//!   subscriber; disposing (or dropping) it stops delivery immediately.
//! - [`LiveHandle`](crate::handle::LiveHandle) is the view-facing adapter: current
//!   connectivity, the latest message on the topic, and an outbound send.
//!
//! The registry talks to channels through the
//! [`ManagedChannel`](crate::connector::ManagedChannel) and
//! [`ChannelConnector`](crate::connector::ChannelConnector) traits, so sharing,
//! fan-out, and teardown logic are all testable without a server.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod connector;
pub mod handle;
pub mod registry;
pub mod subscription;

pub use connector::{ChannelConnector, EndpointResolver, LiveConnector, ManagedChannel};
pub use handle::LiveHandle;
pub use registry::{DEFAULT_GRACE_MS, RegistryConfig, TopicRegistry};
pub use subscription::Subscription;
