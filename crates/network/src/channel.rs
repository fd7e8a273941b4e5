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

//! Managed channel with automatic reconnection.
//!
//! **Design**:
//! - A controller task owns the connect/reconnect loop and the transport.
//! - Outbound sends go through an unbounded command queue drained by the
//!   controller, so callers never hold the connection.
//! - An optional heartbeat task enqueues pings while the channel is open.
//! - State is published through a `tokio::sync::watch` channel; connectivity is
//!   always derivable from the latest value and is never signalled via errors.
//!
//! A transport failure schedules a reconnect per the configured backoff. Once the
//! attempt cap is reached the channel parks in the terminal `Failed` state; only a
//! manual [`Channel::reopen`] restarts it, with a fresh attempt counter. An
//! explicit [`Channel::close`] cancels any pending reconnect timer and guarantees
//! no further automatic attempts.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ChannelConfig,
    error::NetworkError,
    state::ChannelState,
    transport::Transport,
    types::{Envelope, MessageHandler},
};

/// A managed connection to a single logical endpoint.
///
/// Cheap to clone; all clones share the same underlying connection. Dropping the
/// last clone does not close the channel; call [`Channel::close`] for that.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ChannelConfig,
    handler: MessageHandler,
    state_tx: watch::Sender<ChannelState>,
    outbound_tx: Mutex<mpsc::UnboundedSender<String>>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
}

impl Channel {
    /// Opens a channel to `config.url` and starts connecting in the background.
    ///
    /// Returns immediately; observe [`Channel::watch_state`] for the outcome.
    /// `handler` receives decoded envelopes only: malformed payloads are dropped
    /// and logged, and pong replies are consumed as liveness signals.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn open(config: ChannelConfig, handler: MessageHandler) -> Self {
        let (state_tx, _state_rx) = watch::channel(ChannelState::Idle);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let inner = Arc::new(ChannelInner {
            config,
            handler,
            state_tx,
            outbound_tx: Mutex::new(outbound_tx),
            cancel: Mutex::new(cancel.clone()),
            running: AtomicBool::new(true),
        });

        tokio::spawn(run_controller(inner.clone(), outbound_rx, cancel));

        Self { inner }
    }

    /// Returns the current channel state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    /// Returns a watch receiver that yields every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns true if the channel is connected.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Enqueues `envelope` for delivery to the server.
    ///
    /// Returns `true` only when the channel is `Open` and the message was accepted
    /// by the outbound queue. Any other state returns `false` without error, since
    /// message loss during reconnect is expected and must not crash callers.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let state = self.state();
        if !state.is_open() {
            tracing::debug!("Cannot send - channel is {state}");
            return false;
        }

        match envelope.to_json() {
            Ok(text) => self.inner.enqueue(text),
            Err(e) => {
                tracing::warn!("Failed to encode outbound message: {e}");
                false
            }
        }
    }

    /// Closes the channel deliberately.
    ///
    /// Cancels any pending reconnect timer; no further automatic attempts follow.
    /// Idempotent.
    pub fn close(&self) {
        tracing::debug!(url = %self.inner.config.url, "Closing channel");
        if let Ok(cancel) = self.inner.cancel.lock() {
            cancel.cancel();
        }
        // A live controller publishes `Closed` itself once it has parked; only a
        // channel whose controller already exited needs the transition here.
        if !self.inner.running.load(Ordering::SeqCst) {
            self.inner.set_state(ChannelState::Closed);
        }
    }

    /// Restarts a `Closed` or `Failed` channel with a fresh attempt counter.
    ///
    /// Idempotent while the channel is live: returns `false` without side effects
    /// if the controller is still running (`Connecting` or `Open`), `true` if a
    /// new connection cycle was started.
    pub fn reopen(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Reopen ignored - channel already live");
            return false;
        }

        tracing::debug!(url = %self.inner.config.url, "Reopening channel");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        if let Ok(mut guard) = self.inner.outbound_tx.lock() {
            *guard = outbound_tx;
        }

        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.inner.cancel.lock() {
            *guard = cancel.clone();
        }

        self.inner.set_state(ChannelState::Idle);
        tokio::spawn(run_controller(self.inner.clone(), outbound_rx, cancel));
        true
    }

    /// The endpoint URL this channel connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Channel))
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl ChannelInner {
    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!("Channel state {previous} -> {state}");
        }
    }

    fn enqueue(&self, text: String) -> bool {
        match self.outbound_tx.lock() {
            Ok(tx) => tx.send(text).is_ok(),
            Err(_) => false,
        }
    }

    fn dispatch(&self, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) if envelope.is_pong() => tracing::trace!("Received pong"),
            Ok(envelope) => (self.handler)(envelope),
            Err(e) => tracing::warn!("Dropping malformed payload: {e}"),
        }
    }
}

/// Why the I/O loop for one connection ended.
enum IoExit {
    /// The channel was closed deliberately.
    Cancelled,
    /// The remote closed the connection.
    Remote,
    /// The transport reported an error.
    Error,
}

async fn run_controller(
    inner: Arc<ChannelInner>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    tracing::debug!(url = %inner.config.url, "Started task 'controller'");

    let mut backoff = inner.config.backoff();
    let mut failures: u32 = 0;
    let connect_timeout = inner.config.connect_timeout();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        inner.set_state(ChannelState::Connecting);

        let attempt = tokio::select! {
            () = cancel.cancelled() => break,
            result = tokio::time::timeout(connect_timeout, Transport::connect(&inner.config)) => result,
        };

        match attempt {
            Ok(Ok(mut transport)) => {
                failures = 0;
                backoff.reset();
                inner.set_state(ChannelState::Open);
                tracing::debug!(url = %inner.config.url, "Connected");

                let heartbeat_task = inner
                    .config
                    .heartbeat_interval()
                    .map(|interval| spawn_heartbeat_task(inner.clone(), interval));

                let exit = run_io(&inner, &mut transport, &mut outbound_rx, &cancel).await;

                if let Some(task) = heartbeat_task {
                    task.abort();
                    tracing::debug!("Aborted task 'heartbeat'");
                }
                transport.shutdown().await;

                match exit {
                    IoExit::Cancelled => break,
                    IoExit::Remote => tracing::debug!("Connection closed by remote"),
                    IoExit::Error => tracing::warn!("Connection lost"),
                }
            }
            Ok(Err(e)) => tracing::warn!("Connect attempt failed: {e}"),
            Err(_) => tracing::warn!(
                "Connect attempt failed: {}",
                NetworkError::Timeout(connect_timeout)
            ),
        }

        if cancel.is_cancelled() {
            break;
        }

        failures += 1;
        let delay = backoff.next_duration();
        if failures >= inner.config.reconnect_max_attempts {
            tracing::error!("{}", NetworkError::Exhausted(failures));
            park(&inner, ChannelState::Failed);
            tracing::debug!("Completed task 'controller'");
            return;
        }

        if !delay.is_zero() {
            tracing::debug!("Backing off for {:.1}s...", delay.as_secs_f64());
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    // The loop is only left on a deliberate shutdown path.
    park(&inner, ChannelState::Closed);
    tracing::debug!("Completed task 'controller'");
}

/// Marks the controller as restartable, then publishes the terminal state.
///
/// The order is load-bearing: an observer acting on `Closed` or `Failed` (for
/// example a registry reviving a channel for a new subscriber) must find
/// `reopen` ready to succeed.
fn park(inner: &ChannelInner, state: ChannelState) {
    inner.running.store(false, Ordering::SeqCst);
    inner.set_state(state);
}

async fn run_io(
    inner: &Arc<ChannelInner>,
    transport: &mut Transport,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> IoExit {
    enum Step {
        Outbound(Option<String>),
        Inbound(Option<Result<String, NetworkError>>),
    }

    loop {
        let step = tokio::select! {
            () = cancel.cancelled() => return IoExit::Cancelled,
            command = outbound_rx.recv() => Step::Outbound(command),
            incoming = transport.next() => Step::Inbound(incoming),
        };

        match step {
            Step::Outbound(Some(text)) => {
                if let Err(e) = transport.send(text).await {
                    tracing::error!("Failed to send message: {e}");
                    return IoExit::Error;
                }
            }
            Step::Outbound(None) => {
                // Sender replaced or dropped; treat as a deliberate shutdown.
                tracing::debug!("Outbound queue closed - terminating");
                return IoExit::Cancelled;
            }
            Step::Inbound(Some(Ok(text))) => inner.dispatch(&text),
            Step::Inbound(Some(Err(e))) => {
                tracing::error!("Transport error: {e}");
                return IoExit::Error;
            }
            Step::Inbound(None) => return IoExit::Remote,
        }
    }
}

fn spawn_heartbeat_task(
    inner: Arc<ChannelInner>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tracing::debug!("Started task 'heartbeat'");

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            if !inner.state().is_open() {
                break;
            }

            match Envelope::ping().to_json() {
                Ok(text) => {
                    if inner.enqueue(text) {
                        tracing::trace!("Enqueued heartbeat");
                    } else {
                        tracing::debug!("Failed to enqueue heartbeat - terminating");
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to encode heartbeat: {e}"),
            }
        }

        tracing::debug!("Completed task 'heartbeat'");
    })
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::types::channel_message_handler;

    fn fast_config(url: &str) -> ChannelConfig {
        let mut config = ChannelConfig::new(url);
        config.connect_timeout_ms = 500;
        config.reconnect_delay_initial_ms = 10;
        config.reconnect_delay_max_ms = 50;
        config.reconnect_max_attempts = 3;
        config
    }

    async fn await_state(channel: &Channel, target: ChannelState) {
        let mut rx = channel.watch_state();
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if *rx.borrow_and_update() == target {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {target}"));
        assert_eq!(channel.state(), target);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_after_attempt_cap() {
        // Nothing listens on this port; every attempt is refused.
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ws://127.0.0.1:9"), handler);

        await_state(&channel, ChannelState::Failed).await;

        // Terminal: no automatic attempts follow
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(channel.state(), ChannelState::Failed);
    }

    #[rstest]
    #[tokio::test]
    async fn test_close_while_connecting_cancels_reconnect() {
        let (handler, _rx) = channel_message_handler();
        let mut config = fast_config("ws://127.0.0.1:9");
        // Long enough that the channel is parked in a backoff sleep when we close
        config.reconnect_delay_initial_ms = 5_000;
        config.reconnect_max_attempts = 10;
        let channel = Channel::open(config, handler);

        await_state(&channel, ChannelState::Connecting).await;
        channel.close();

        await_state(&channel, ChannelState::Closed).await;

        // The pending reconnect timer was cancelled - no later transition occurs
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[rstest]
    #[tokio::test]
    async fn test_send_refused_when_not_open() {
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ws://127.0.0.1:9"), handler);

        assert!(!channel.send(&Envelope::new("update")));

        await_state(&channel, ChannelState::Failed).await;
        assert!(!channel.send(&Envelope::new("update")));
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_scheme_fails() {
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ftp://127.0.0.1:9"), handler);

        await_state(&channel, ChannelState::Failed).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_reopen_resets_attempt_counter() {
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ws://127.0.0.1:9"), handler);

        await_state(&channel, ChannelState::Failed).await;

        // Manual reopen restarts the cycle; it fails again, but only after a
        // fresh round of attempts.
        assert!(channel.reopen());
        await_state(&channel, ChannelState::Failed).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_reopen_is_noop_while_live() {
        let (handler, _rx) = channel_message_handler();
        let mut config = fast_config("ws://127.0.0.1:9");
        config.reconnect_delay_initial_ms = 5_000;
        config.reconnect_max_attempts = 10;
        let channel = Channel::open(config, handler);

        await_state(&channel, ChannelState::Connecting).await;
        assert!(!channel.reopen());

        channel.close();
        await_state(&channel, ChannelState::Closed).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_reopen_succeeds_once_closed_observed() {
        let (handler, _rx) = channel_message_handler();
        let mut config = fast_config("ws://127.0.0.1:9");
        config.reconnect_delay_initial_ms = 5_000;
        config.reconnect_max_attempts = 10;
        let channel = Channel::open(config, handler);

        // Close while the controller is live; once `Closed` is observable the
        // controller has parked, so a reopen must not be refused.
        await_state(&channel, ChannelState::Connecting).await;
        channel.close();
        await_state(&channel, ChannelState::Closed).await;
        assert!(channel.reopen());

        channel.close();
        await_state(&channel, ChannelState::Closed).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_reopen_succeeds_once_failed_observed() {
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ws://127.0.0.1:9"), handler);

        await_state(&channel, ChannelState::Failed).await;
        assert!(channel.reopen());

        channel.close();
        await_state(&channel, ChannelState::Closed).await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (handler, _rx) = channel_message_handler();
        let channel = Channel::open(fast_config("ws://127.0.0.1:9"), handler);

        channel.close();
        channel.close();
        await_state(&channel, ChannelState::Closed).await;
    }
}
