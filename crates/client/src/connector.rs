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

//! The seam between the registry and the transport layer.
//!
//! The registry depends on [`ManagedChannel`] and [`ChannelConnector`] rather than
//! on the concrete channel, so registry behavior (sharing, fan-out, teardown) is
//! testable without sockets.

use std::sync::Arc;

use livelink_network::{Channel, ChannelConfig, ChannelState, Envelope, MessageHandler};
use tokio::sync::watch;

/// The channel surface the registry needs.
pub trait ManagedChannel: Send + Sync {
    /// Returns the current channel state.
    fn state(&self) -> ChannelState;

    /// Returns a watch receiver yielding state transitions.
    fn watch_state(&self) -> watch::Receiver<ChannelState>;

    /// Enqueues `envelope` for delivery; returns `false` unless the channel is open.
    fn send(&self, envelope: &Envelope) -> bool;

    /// Closes the channel deliberately.
    fn close(&self);

    /// Restarts a closed or failed channel; returns `false` if it was already live.
    fn reopen(&self) -> bool;
}

impl ManagedChannel for Channel {
    fn state(&self) -> ChannelState {
        Self::state(self)
    }

    fn watch_state(&self) -> watch::Receiver<ChannelState> {
        Self::watch_state(self)
    }

    fn send(&self, envelope: &Envelope) -> bool {
        Self::send(self, envelope)
    }

    fn close(&self) {
        Self::close(self);
    }

    fn reopen(&self) -> bool {
        Self::reopen(self)
    }
}

/// Creates channels on behalf of the registry.
pub trait ChannelConnector: Send + Sync {
    /// Opens a channel to `endpoint`, delivering inbound messages to `handler`.
    fn connect(&self, endpoint: &str, handler: MessageHandler) -> Arc<dyn ManagedChannel>;
}

/// Maps a topic key to the endpoint URL serving it.
pub type EndpointResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The production connector: opens real channels from a configuration template.
#[derive(Clone, Debug)]
pub struct LiveConnector {
    template: ChannelConfig,
}

impl LiveConnector {
    /// Creates a connector that stamps per-topic channels out of `template`.
    ///
    /// The template's `url` field is ignored; each channel gets the endpoint the
    /// resolver produces for its topic.
    #[must_use]
    pub const fn new(template: ChannelConfig) -> Self {
        Self { template }
    }
}

impl ChannelConnector for LiveConnector {
    fn connect(&self, endpoint: &str, handler: MessageHandler) -> Arc<dyn ManagedChannel> {
        Arc::new(Channel::open(self.template.for_endpoint(endpoint), handler))
    }
}
