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

use std::sync::{Arc, Weak, atomic::Ordering};

use uuid::Uuid;

use crate::registry::{RegistryInner, SubscriberSlot};

/// A live subscription to one topic.
///
/// Delivery stops when this is disposed or dropped. The last subscription to
/// leave a topic starts the channel's grace-period teardown timer.
pub struct Subscription {
    registry: Weak<RegistryInner>,
    topic: String,
    slot: Arc<SubscriberSlot>,
}

impl Subscription {
    pub(crate) const fn new(
        registry: Weak<RegistryInner>,
        topic: String,
        slot: Arc<SubscriberSlot>,
    ) -> Self {
        Self {
            registry,
            topic,
            slot,
        }
    }

    /// The topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The unique id of this subscription.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.slot.id
    }

    /// Returns true if this subscription has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.slot.disposed.load(Ordering::SeqCst)
    }

    /// Stops delivery to this subscriber. Idempotent.
    ///
    /// The disposed flag takes effect immediately, even for a dispatch already in
    /// flight; the registry checks it right before each invocation.
    pub fn dispose(&self) {
        if self.slot.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.topic, &self.slot);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscription))
            .field("topic", &self.topic)
            .field("id", &self.slot.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
