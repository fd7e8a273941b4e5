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

//! Exponential backoff for reconnect scheduling.
//!
//! The delay for attempt `n` (zero-based) is `min(base × factor^n, cap)`, so the
//! sequence is monotonically non-decreasing until [`ReconnectBackoff::reset`] is
//! called after a successful connection. Optional random jitter is added on top of
//! each delay to avoid synchronized reconnection storms, and an "immediate first"
//! flag lets the very first reconnect attempt run without any delay.

use std::time::Duration;

use rand::RngExt;

/// Attempt-indexed exponential backoff with optional jitter.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    /// The delay for the first (zero-th) attempt.
    delay_base: Duration,
    /// The upper bound any computed delay is clamped to.
    delay_cap: Duration,
    /// The multiplier applied per attempt.
    factor: f64,
    /// The maximum random jitter to add (in milliseconds).
    jitter_ms: u64,
    /// If true, the next call to `next_duration` returns zero delay.
    immediate_pending: bool,
    /// Whether a fresh sequence starts with an immediate attempt.
    immediate_first: bool,
    /// Number of delays handed out since the last reset.
    attempt: u32,
}

impl ReconnectBackoff {
    /// Creates a new [`ReconnectBackoff`].
    ///
    /// A `factor` below 1.0 would make delays shrink between attempts, so it is
    /// clamped to 1.0.
    #[must_use]
    pub fn new(
        delay_base: Duration,
        delay_cap: Duration,
        factor: f64,
        jitter_ms: u64,
        immediate_first: bool,
    ) -> Self {
        Self {
            delay_base,
            delay_cap,
            factor: factor.max(1.0),
            jitter_ms,
            immediate_pending: immediate_first,
            immediate_first,
            attempt: 0,
        }
    }

    /// Returns the delay to sleep before the next reconnect attempt and advances
    /// the attempt counter.
    ///
    /// When the immediate-first flag is set and no delay has been handed out since
    /// the last reset, this returns `Duration::ZERO` without consuming an attempt.
    pub fn next_duration(&mut self) -> Duration {
        if self.immediate_pending {
            self.immediate_pending = false;
            return Duration::ZERO;
        }

        let delay = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        if self.jitter_ms == 0 {
            delay
        } else {
            let jitter = rand::rng().random_range(0..=self.jitter_ms);
            delay + Duration::from_millis(jitter)
        }
    }

    /// Returns the un-jittered delay for a given zero-based attempt index.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.delay_base.as_secs_f64() * self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_secs_f64(scaled).min(self.delay_cap)
    }

    /// Resets the sequence to its initial state, re-arming the immediate-first
    /// behavior. Called after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.immediate_pending = self.immediate_first;
    }

    /// Returns the number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
