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

//! Message envelope and handler types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message kind used for client heartbeats.
pub const KIND_PING: &str = "ping";
/// Message kind for server heartbeat replies. A pong is a liveness signal only and
/// triggers no state change.
pub const KIND_PONG: &str = "pong";

/// The wire envelope for every message on a channel.
///
/// A JSON object with at least a `type` field used for dispatch routing, an
/// optional `topic`, and arbitrary remaining fields. Unknown `type` values pass
/// through to subscribers unfiltered; schema validation is the subscriber's
/// responsibility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message kind (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: String,
    /// The logical topic this message belongs to, if the server includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// All remaining fields of the message object.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope of the given kind with an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            topic: None,
            payload: serde_json::Map::new(),
        }
    }

    /// Sets the topic field.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Creates the client heartbeat message, `{"type":"ping","timestamp":<epoch-ms>}`.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(KIND_PING).with_field(
            "timestamp",
            Value::from(chrono::Utc::now().timestamp_millis()),
        )
    }

    /// Returns true if this is a client heartbeat.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.kind == KIND_PING
    }

    /// Returns true if this is a server heartbeat reply.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.kind == KIND_PONG
    }

    /// Decodes an envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the decode error if `text` is not a JSON object with a `type` field.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encodes this envelope as JSON text.
    ///
    /// # Errors
    ///
    /// Returns the encode error if a payload value cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Function type for handling decoded inbound messages.
///
/// The channel invokes the handler from its I/O task; implementations must be
/// cheap or hand off to their own executor.
pub type MessageHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Creates a channel-based message handler.
///
/// Returns the handler together with a receiver, for consumers that prefer
/// streams over callbacks.
#[must_use]
pub fn channel_message_handler() -> (
    MessageHandler,
    tokio::sync::mpsc::UnboundedReceiver<Envelope>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = Arc::new(move |envelope: Envelope| {
        if let Err(e) = tx.send(envelope) {
            tracing::debug!("Failed to forward message to channel: {e}");
        }
    });
    (handler, rx)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_decode_known_shape() {
        let envelope =
            Envelope::from_json(r#"{"type":"notification","topic":"user:7","id":1}"#).unwrap();
        assert_eq!(envelope.kind, "notification");
        assert_eq!(envelope.topic.as_deref(), Some("user:7"));
        assert_eq!(envelope.payload.get("id"), Some(&json!(1)));
    }

    #[rstest]
    fn test_unknown_kind_passes_through() {
        // The envelope does not validate `type`; unknown kinds are preserved as-is.
        let envelope = Envelope::from_json(r#"{"type":"totally-new","weird":[1,2]}"#).unwrap();
        assert_eq!(envelope.kind, "totally-new");
        assert_eq!(envelope.payload.get("weird"), Some(&json!([1, 2])));
    }

    #[rstest]
    fn test_round_trip_preserves_payload() {
        let envelope = Envelope::new("score")
            .with_topic("event:42:schedule")
            .with_field("home", json!(3))
            .with_field("away", json!(1));

        let text = envelope.to_json().unwrap();
        let decoded = Envelope::from_json(&text).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[rstest]
    #[case("{oops")]
    #[case("[1,2,3]")]
    #[case(r#"{"no_type_field":true}"#)]
    fn test_malformed_rejected(#[case] text: &str) {
        assert!(Envelope::from_json(text).is_err());
    }

    #[rstest]
    fn test_ping_shape() {
        let ping = Envelope::ping();
        assert!(ping.is_ping());
        assert!(!ping.is_pong());

        let timestamp = ping.payload.get("timestamp").and_then(Value::as_i64).unwrap();
        assert!(timestamp > 0);

        let text = ping.to_json().unwrap();
        assert!(text.starts_with(r#"{"type":"ping""#));
    }

    #[rstest]
    fn test_channel_message_handler_forwards() {
        let (handler, mut rx) = channel_message_handler();
        handler(Envelope::new("a"));
        handler(Envelope::new("b"));

        assert_eq!(rx.try_recv().unwrap().kind, "a");
        assert_eq!(rx.try_recv().unwrap().kind, "b");
        assert!(rx.try_recv().is_err());
    }
}
