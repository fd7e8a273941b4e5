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

//! Error taxonomy for the transport layer.
//!
//! None of these variants reach subscriber callbacks: transport failures are
//! recovered via reconnects and surface only as state changes, malformed payloads
//! are dropped and logged, and attempt-cap exhaustion surfaces as the terminal
//! `Failed` state.

use std::time::Duration;

use crate::state::ChannelState;

/// Errors produced inside the transport and channel layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The endpoint URL could not be parsed or uses an unsupported scheme.
    #[error("invalid endpoint URL '{0}'")]
    InvalidUrl(String),

    /// The transport-level connection failed or dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// A payload could not be decoded as a message envelope.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An operation did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The reconnect attempt cap was exhausted.
    #[error("reconnect attempts exhausted after {0} consecutive failures")]
    Exhausted(u32),

    /// The channel is not in a state that accepts the operation.
    #[error("channel is {0} and cannot accept the operation")]
    NotOpen(ChannelState),
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
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
    fn test_display() {
        assert_eq!(
            NetworkError::InvalidUrl("ftp://nope".to_string()).to_string(),
            "invalid endpoint URL 'ftp://nope'"
        );
        assert_eq!(
            NetworkError::Exhausted(5).to_string(),
            "reconnect attempts exhausted after 5 consecutive failures"
        );
        assert_eq!(
            NetworkError::NotOpen(ChannelState::Connecting).to_string(),
            "channel is CONNECTING and cannot accept the operation"
        );
    }

    #[rstest]
    fn test_malformed_from_serde() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error = NetworkError::from(parse_error);
        assert!(matches!(error, NetworkError::Malformed(_)));
        assert!(error.to_string().starts_with("malformed payload"));
    }
}
