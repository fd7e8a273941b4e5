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

//! Topic-keyed channel sharing with subscriber fan-out.
//!
//! The registry guarantees at most one live channel per topic key: the first
//! subscriber to a topic opens the channel, later subscribers share it, and the
//! channel is closed only after the last subscriber has been gone for the full
//! grace period. A resubscribe inside the grace window keeps the channel alive,
//! which makes rapid view churn (navigation back and forth) free.
//!
//! Fan-out iterates a snapshot of the subscriber list taken before the first
//! callback runs, so callbacks may subscribe or dispose freely without affecting
//! the in-flight dispatch. A panicking subscriber is logged and skipped; it never
//! poisons the channel or its peers.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use livelink_network::{ChannelConfig, ChannelState, Envelope, MessageHandler};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    connector::{ChannelConnector, EndpointResolver, LiveConnector, ManagedChannel},
    subscription::Subscription,
};

/// The default time an unwatched channel is kept alive before teardown.
pub const DEFAULT_GRACE_MS: u64 = 5_000;

/// Configuration for a [`TopicRegistry`].
#[derive(Clone)]
pub struct RegistryConfig {
    /// The channel configuration template applied to every topic channel.
    pub channel: ChannelConfig,
    /// Maps a topic key to the endpoint URL serving it.
    pub resolver: EndpointResolver,
    /// How long (milliseconds) a channel with no subscribers is kept alive.
    pub grace_ms: u64,
}

impl RegistryConfig {
    /// Creates a configuration with the default grace period.
    #[must_use]
    pub fn new(channel: ChannelConfig, resolver: EndpointResolver) -> Self {
        Self {
            channel,
            resolver,
            grace_ms: DEFAULT_GRACE_MS,
        }
    }
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RegistryConfig))
            .field("channel", &self.channel)
            .field("grace_ms", &self.grace_ms)
            .finish_non_exhaustive()
    }
}

/// Shares one channel per topic among any number of subscribers.
///
/// Cheap to clone; all clones share the same topic table.
#[derive(Clone)]
pub struct TopicRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    connector: Arc<dyn ChannelConnector>,
    resolver: EndpointResolver,
    grace: Duration,
    topics: DashMap<String, Arc<TopicEntry>>,
}

struct TopicEntry {
    channel: Arc<dyn ManagedChannel>,
    subscribers: Mutex<Vec<Arc<SubscriberSlot>>>,
    /// Bumped on every subscribe; a pending grace-period teardown aborts if the
    /// generation moved while it slept.
    generation: AtomicU64,
}

pub(crate) struct SubscriberSlot {
    pub(crate) id: Uuid,
    pub(crate) disposed: AtomicBool,
    callback: Box<dyn Fn(Envelope) + Send + Sync>,
}

impl TopicRegistry {
    /// Creates a registry that opens real channels per `config`.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let connector = Arc::new(LiveConnector::new(config.channel));
        Self::with_connector(connector, config.resolver, Duration::from_millis(config.grace_ms))
    }

    /// Creates a registry over a custom connector.
    #[must_use]
    pub fn with_connector(
        connector: Arc<dyn ChannelConnector>,
        resolver: EndpointResolver,
        grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connector,
                resolver,
                grace,
                topics: DashMap::new(),
            }),
        }
    }

    /// Subscribes `callback` to `topic`.
    ///
    /// Opens the topic's channel if this is the first subscriber, revives it if a
    /// previous teardown left it closed, and otherwise shares the existing one.
    /// The returned [`Subscription`] stops delivery when disposed or dropped.
    pub fn subscribe(
        &self,
        topic: &str,
        callback: impl Fn(Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        let slot = Arc::new(SubscriberSlot {
            id: Uuid::new_v4(),
            disposed: AtomicBool::new(false),
            callback: Box::new(callback),
        });

        let entry = self.inner.entry_for(topic);
        if let Ok(mut subscribers) = entry.subscribers.lock() {
            subscribers.push(slot.clone());
        }
        entry.generation.fetch_add(1, Ordering::SeqCst);

        if entry.channel.state().is_terminal() {
            tracing::debug!(topic, "Reviving channel for new subscriber");
            entry.channel.reopen();
        }

        tracing::debug!(topic, subscriber = %slot.id, "Subscribed");
        Subscription::new(Arc::downgrade(&self.inner), topic.to_string(), slot)
    }

    /// Sends `envelope` on the topic's channel.
    ///
    /// Returns `false` if the topic has no channel or the channel is not open.
    pub fn send(&self, topic: &str, envelope: &Envelope) -> bool {
        match self.inner.topics.get(topic) {
            Some(entry) => entry.channel.send(envelope),
            None => {
                tracing::debug!(topic, "Cannot send - no channel for topic");
                false
            }
        }
    }

    /// Returns the state of the topic's channel, if one exists.
    #[must_use]
    pub fn topic_state(&self, topic: &str) -> Option<ChannelState> {
        self.inner.topics.get(topic).map(|entry| entry.channel.state())
    }

    /// Returns a watch receiver for the topic's channel state, if one exists.
    #[must_use]
    pub fn watch_topic(&self, topic: &str) -> Option<watch::Receiver<ChannelState>> {
        self.inner
            .topics
            .get(topic)
            .map(|entry| entry.channel.watch_state())
    }

    /// Returns the number of live subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .and_then(|entry| entry.subscribers.lock().ok().map(|subs| subs.len()))
            .unwrap_or(0)
    }

    /// Returns the number of topics with a channel record (live or torn down).
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    /// Removes topic records that have no subscribers and a terminal channel.
    ///
    /// Returns the number of records removed. Safe to call periodically; a topic
    /// purged here is simply recreated on its next subscribe.
    pub fn purge_idle(&self) -> usize {
        let before = self.inner.topics.len();
        self.inner.topics.retain(|_topic, entry| {
            let empty = entry
                .subscribers
                .lock()
                .map(|subs| subs.is_empty())
                .unwrap_or(false);
            !(empty && entry.channel.state().is_terminal())
        });
        let removed = before - self.inner.topics.len();
        if removed > 0 {
            tracing::debug!("Purged {removed} idle topic record(s)");
        }
        removed
    }

    /// Closes every channel and clears the topic table.
    ///
    /// Existing subscriptions become inert; disposing them is still safe.
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down registry ({} topics)", self.inner.topics.len());
        for entry in &self.inner.topics {
            entry.value().channel.close();
        }
        self.inner.topics.clear();
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(TopicRegistry))
            .field("topics", &self.inner.topics.len())
            .finish_non_exhaustive()
    }
}

impl RegistryInner {
    /// Returns the entry for `topic`, creating its channel on first use.
    fn entry_for(self: &Arc<Self>, topic: &str) -> Arc<TopicEntry> {
        if let Some(entry) = self.topics.get(topic) {
            return Arc::clone(&entry);
        }

        // Build the channel outside the map lock: the connector may do arbitrary
        // work, and the inbound handler takes the same lock to route messages.
        let endpoint = (self.resolver)(topic);
        let weak = Arc::downgrade(self);
        let route_key = topic.to_string();
        let handler: MessageHandler = Arc::new(move |envelope: Envelope| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(&route_key, envelope);
            }
        });
        tracing::debug!(topic, endpoint, "Opening channel for topic");
        let channel = self.connector.connect(&endpoint, handler);

        match self.topics.entry(topic.to_string()) {
            Entry::Occupied(occupied) => {
                // Lost the creation race; discard our channel.
                channel.close();
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(TopicEntry {
                    channel,
                    subscribers: Mutex::new(Vec::new()),
                    generation: AtomicU64::new(0),
                });
                vacant.insert(entry.clone());
                entry
            }
        }
    }

    /// Fans `envelope` out to every live subscriber of `topic`.
    fn dispatch(&self, topic: &str, envelope: Envelope) {
        let Some(entry) = self.topics.get(topic).map(|entry| Arc::clone(&entry)) else {
            tracing::trace!(topic, "Dropping message for unknown topic");
            return;
        };

        // Snapshot before invoking anything: callbacks may subscribe or dispose,
        // and neither affects this dispatch.
        let snapshot: Vec<Arc<SubscriberSlot>> = entry
            .subscribers
            .lock()
            .map(|subs| subs.clone())
            .unwrap_or_default();

        for slot in snapshot {
            // Re-check at the last moment: a peer callback may have disposed this
            // subscriber moments ago.
            if slot.disposed.load(Ordering::SeqCst) {
                continue;
            }
            let payload = envelope.clone();
            if catch_unwind(AssertUnwindSafe(|| (slot.callback)(payload))).is_err() {
                tracing::error!(
                    topic,
                    subscriber = %slot.id,
                    "Subscriber callback panicked - continuing fan-out",
                );
            }
        }
    }

    /// Removes `slot` from `topic` and schedules teardown if it was the last one.
    pub(crate) fn unsubscribe(self: &Arc<Self>, topic: &str, slot: &SubscriberSlot) {
        let Some(entry) = self.topics.get(topic).map(|entry| Arc::clone(&entry)) else {
            return;
        };

        let remaining = {
            let Ok(mut subscribers) = entry.subscribers.lock() else {
                return;
            };
            subscribers.retain(|candidate| candidate.id != slot.id);
            subscribers.len()
        };
        tracing::debug!(topic, subscriber = %slot.id, remaining, "Unsubscribed");

        if remaining > 0 {
            return;
        }

        let generation = entry.generation.load(Ordering::SeqCst);
        let weak = Arc::downgrade(self);
        let topic = topic.to_string();
        let grace = self.grace;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime to sleep on; tear down now.
            tracing::debug!(topic, "No runtime for grace timer - closing channel");
            entry.channel.close();
            return;
        };

        runtime.spawn(async move {
            tokio::time::sleep(grace).await;

            let Some(inner) = weak.upgrade() else { return };
            let Some(entry) = inner.topics.get(&topic).map(|entry| Arc::clone(&entry)) else {
                return;
            };

            let still_empty = entry
                .subscribers
                .lock()
                .map(|subs| subs.is_empty())
                .unwrap_or(false);
            if still_empty && entry.generation.load(Ordering::SeqCst) == generation {
                tracing::debug!(topic, "Grace period elapsed - closing idle channel");
                entry.channel.close();
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_registry_config_defaults() {
        let resolver: EndpointResolver =
            Arc::new(|topic: &str| format!("wss://live.example.com/{topic}"));
        let config = RegistryConfig::new(ChannelConfig::new(""), resolver);

        assert_eq!(config.grace_ms, DEFAULT_GRACE_MS);
        assert_eq!(
            (config.resolver)("event:42:schedule"),
            "wss://live.example.com/event:42:schedule"
        );
    }

    #[rstest]
    fn test_empty_registry_counters() {
        let resolver: EndpointResolver = Arc::new(|topic: &str| topic.to_string());
        let registry = TopicRegistry::with_connector(
            Arc::new(crate::connector::LiveConnector::new(ChannelConfig::new(""))),
            resolver,
            Duration::from_millis(DEFAULT_GRACE_MS),
        );

        assert_eq!(registry.topic_count(), 0);
        assert_eq!(registry.subscriber_count("anything"), 0);
        assert_eq!(registry.topic_state("anything"), None);
        assert!(!registry.send("anything", &Envelope::new("noop")));
    }
}
