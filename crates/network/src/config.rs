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

//! Configuration for managed channels.

use std::time::Duration;

use crate::backoff::ReconnectBackoff;

/// Configuration for a single managed channel.
///
/// The endpoint URL scheme selects the transport: `ws`/`wss` for WebSocket,
/// `http`/`https` for the long-poll fallback. Per-channel differences such as the
/// heartbeat interval or the backoff constants are expressed here rather than by
/// forking the channel implementation.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// The endpoint URL to connect to.
    pub url: String,
    /// Additional headers for the WebSocket handshake.
    pub headers: Vec<(String, String)>,
    /// The optional heartbeat interval (seconds). `None` disables the heartbeat.
    pub heartbeat_secs: Option<u64>,
    /// The timeout (milliseconds) for a single connection attempt.
    pub connect_timeout_ms: u64,
    /// The initial reconnection delay (milliseconds).
    pub reconnect_delay_initial_ms: u64,
    /// The maximum reconnect delay (milliseconds) for exponential backoff.
    pub reconnect_delay_max_ms: u64,
    /// The exponential backoff factor for reconnection delays.
    pub reconnect_backoff_factor: f64,
    /// The maximum jitter (milliseconds) added to reconnection delays.
    pub reconnect_jitter_ms: u64,
    /// The number of consecutive transport failures tolerated before the channel
    /// transitions to `Failed` and stops reconnecting.
    pub reconnect_max_attempts: u32,
    /// Whether the first reconnect attempt after a drop happens without delay.
    pub reconnect_immediate_first: bool,
    /// The pause (milliseconds) between empty long-poll rounds. Ignored by the
    /// WebSocket transport.
    pub poll_interval_ms: u64,
}

impl ChannelConfig {
    /// Creates a configuration for `url` with the default timing constants.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            heartbeat_secs: None,
            connect_timeout_ms: 10_000,
            reconnect_delay_initial_ms: 1_000,
            reconnect_delay_max_ms: 15_000,
            reconnect_backoff_factor: 2.0,
            reconnect_jitter_ms: 0,
            reconnect_max_attempts: 5,
            reconnect_immediate_first: false,
            poll_interval_ms: 1_000,
        }
    }

    /// Returns a copy of this configuration pointed at a different endpoint.
    ///
    /// Used by the registry to stamp out per-topic channels from one template.
    #[must_use]
    pub fn for_endpoint(&self, url: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.url = url.into();
        config
    }

    /// Builds the backoff state described by this configuration.
    #[must_use]
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            Duration::from_millis(self.reconnect_delay_initial_ms),
            Duration::from_millis(self.reconnect_delay_max_ms),
            self.reconnect_backoff_factor,
            self.reconnect_jitter_ms,
            self.reconnect_immediate_first,
        )
    }

    /// The connect-attempt timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The heartbeat interval as a [`Duration`], if enabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_secs.map(Duration::from_secs)
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
    fn test_defaults() {
        let config = ChannelConfig::new("wss://example.com/live");
        assert_eq!(config.url, "wss://example.com/live");
        assert!(config.headers.is_empty());
        assert_eq!(config.heartbeat_secs, None);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.reconnect_delay_initial_ms, 1_000);
        assert_eq!(config.reconnect_delay_max_ms, 15_000);
        assert_eq!(config.reconnect_backoff_factor, 2.0);
        assert_eq!(config.reconnect_jitter_ms, 0);
        assert_eq!(config.reconnect_max_attempts, 5);
        assert!(!config.reconnect_immediate_first);
    }

    #[rstest]
    fn test_for_endpoint_keeps_constants() {
        let mut template = ChannelConfig::new("");
        template.heartbeat_secs = Some(15);
        template.reconnect_max_attempts = 8;

        let config = template.for_endpoint("ws://127.0.0.1:9001/event/42");
        assert_eq!(config.url, "ws://127.0.0.1:9001/event/42");
        assert_eq!(config.heartbeat_secs, Some(15));
        assert_eq!(config.reconnect_max_attempts, 8);
    }

    #[rstest]
    fn test_default_backoff_sequence() {
        // The default constants produce the documented 1s/2s/4s/8s/15s ladder.
        let mut backoff = ChannelConfig::new("ws://example").backoff();
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_duration().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 15_000]);
    }

    #[rstest]
    fn test_heartbeat_interval() {
        let mut config = ChannelConfig::new("ws://example");
        assert_eq!(config.heartbeat_interval(), None);
        config.heartbeat_secs = Some(30);
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(30)));
    }
}
