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

use std::sync::{Arc, RwLock};

use livelink_network::{ChannelState, Envelope};

use crate::{registry::TopicRegistry, subscription::Subscription};

/// A view-facing handle onto one topic: connectivity, the latest message, and an
/// outbound send.
///
/// Holding the handle keeps the topic subscribed; dropping it releases the
/// subscription (and, if it was the last one, starts the channel's grace-period
/// teardown). Views poll [`LiveHandle::last_message`] rather than registering
/// callbacks, so a handle never calls back into view code.
pub struct LiveHandle {
    registry: TopicRegistry,
    topic: String,
    last: Arc<RwLock<Option<Envelope>>>,
    _subscription: Subscription,
}

impl TopicRegistry {
    /// Creates a [`LiveHandle`] on `topic`, subscribing as a side effect.
    #[must_use]
    pub fn handle(&self, topic: &str) -> LiveHandle {
        let last = Arc::new(RwLock::new(None));
        let cache = last.clone();
        let subscription = self.subscribe(topic, move |envelope: Envelope| {
            if let Ok(mut guard) = cache.write() {
                *guard = Some(envelope);
            }
        });

        LiveHandle {
            registry: self.clone(),
            topic: topic.to_string(),
            last,
            _subscription: subscription,
        }
    }
}

impl LiveHandle {
    /// The topic this handle observes.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns true if the topic's channel is currently open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state().is_some_and(|state| state.is_open())
    }

    /// The state of the topic's channel, if it still has a record.
    #[must_use]
    pub fn state(&self) -> Option<ChannelState> {
        self.registry.topic_state(&self.topic)
    }

    /// The most recent message delivered on the topic, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<Envelope> {
        self.last.read().ok().and_then(|guard| guard.clone())
    }

    /// Sends `envelope` on the topic's channel; `false` when not connected.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.registry.send(&self.topic, envelope)
    }
}

impl std::fmt::Debug for LiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(LiveHandle))
            .field("topic", &self.topic)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
