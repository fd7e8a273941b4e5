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

use std::sync::atomic::{AtomicU8, Ordering};

use strum::{AsRefStr, Display, EnumString};

/// Lifecycle state of a managed channel.
///
/// Transitions: `Idle → Connecting` when the controller starts; `Connecting → Open`
/// on transport success; `Open/Connecting → Connecting` on a scheduled reconnect;
/// `Open/Connecting → Failed` once the attempt cap is exceeded; any state `→ Closed`
/// on an explicit close. `Failed` and `Closed` are terminal until a manual reopen,
/// which resets the attempt counter.
#[derive(Clone, Copy, Debug, Default, Display, Hash, PartialEq, Eq, AsRefStr, EnumString)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChannelState {
    #[default]
    /// No connection attempt has been made yet.
    Idle = 0,
    /// A connection attempt is in progress, either the initial one or a scheduled
    /// reconnect after a transport failure.
    Connecting = 1,
    /// The transport is connected and messages flow in both directions.
    Open = 2,
    /// The channel was closed deliberately. No automatic reconnects will follow.
    Closed = 3,
    /// The reconnect attempt cap was exhausted. No automatic reconnects will follow.
    Failed = 4,
}

impl ChannelState {
    /// Convert a u8 to [`ChannelState`], useful when loading from an `AtomicU8`.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not correspond to a known state.
    #[inline]
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closed,
            4 => Self::Failed,
            _ => panic!("Invalid `ChannelState` value: {value}"),
        }
    }

    #[inline]
    #[must_use]
    pub fn from_atomic(value: &AtomicU8) -> Self {
        Self::from_u8(value.load(Ordering::SeqCst))
    }

    /// Convert a [`ChannelState`] to a u8, useful when storing to an `AtomicU8`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if the channel is connected and can deliver messages.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true if a connection attempt is in progress.
    #[inline]
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Returns true if the channel was closed deliberately.
    #[inline]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if the channel gave up after exhausting its reconnect attempts.
    #[inline]
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if no further automatic transitions will occur from this state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
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
    #[case(ChannelState::Idle, 0)]
    #[case(ChannelState::Connecting, 1)]
    #[case(ChannelState::Open, 2)]
    #[case(ChannelState::Closed, 3)]
    #[case(ChannelState::Failed, 4)]
    fn test_u8_round_trip(#[case] state: ChannelState, #[case] value: u8) {
        assert_eq!(state.as_u8(), value);
        assert_eq!(ChannelState::from_u8(value), state);
    }

    #[rstest]
    fn test_atomic_round_trip() {
        let atomic = AtomicU8::new(ChannelState::Connecting.as_u8());
        assert_eq!(ChannelState::from_atomic(&atomic), ChannelState::Connecting);

        atomic.store(ChannelState::Failed.as_u8(), Ordering::SeqCst);
        assert_eq!(ChannelState::from_atomic(&atomic), ChannelState::Failed);
    }

    #[rstest]
    fn test_predicates() {
        assert!(ChannelState::Open.is_open());
        assert!(ChannelState::Connecting.is_connecting());
        assert!(ChannelState::Closed.is_closed());
        assert!(ChannelState::Failed.is_failed());

        assert!(ChannelState::Closed.is_terminal());
        assert!(ChannelState::Failed.is_terminal());
        assert!(!ChannelState::Idle.is_terminal());
        assert!(!ChannelState::Connecting.is_terminal());
        assert!(!ChannelState::Open.is_terminal());
    }

    #[rstest]
    fn test_display() {
        assert_eq!(ChannelState::Connecting.to_string(), "CONNECTING");
        assert_eq!(ChannelState::Failed.as_ref(), "FAILED");
    }

    #[rstest]
    #[should_panic(expected = "Invalid `ChannelState` value")]
    fn test_from_u8_invalid() {
        let _ = ChannelState::from_u8(9);
    }
}
