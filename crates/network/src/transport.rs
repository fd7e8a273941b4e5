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

//! Transport strategies behind a single interface.
//!
//! The transport is selected by the endpoint URL scheme at open time: `ws`/`wss`
//! endpoints use a WebSocket stream, `http`/`https` endpoints use a long-poll
//! loop. The channel above never branches on the variant; it only calls
//! `send`/`next`/`shutdown`.
//!
//! WebSocket control frames (ping/pong/close) are handled here; callers only ever
//! see payload text.

use std::{collections::VecDeque, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
    },
};
use url::Url;

use crate::{config::ChannelConfig, error::NetworkError};

/// The transport family an endpoint URL maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransportKind {
    WebSocket,
    LongPoll,
}

impl TransportKind {
    /// Capability detection: which transport serves this endpoint.
    pub(crate) fn for_url(url: &Url) -> Result<Self, NetworkError> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self::WebSocket),
            "http" | "https" => Ok(Self::LongPoll),
            _ => Err(NetworkError::InvalidUrl(url.to_string())),
        }
    }
}

/// A single live connection to one endpoint.
#[derive(Debug)]
pub(crate) enum Transport {
    WebSocket(WsTransport),
    LongPoll(PollTransport),
}

impl Transport {
    /// Connects the transport selected by the endpoint URL scheme.
    pub(crate) async fn connect(config: &ChannelConfig) -> Result<Self, NetworkError> {
        let url = Url::parse(&config.url)
            .map_err(|_| NetworkError::InvalidUrl(config.url.clone()))?;

        match TransportKind::for_url(&url)? {
            TransportKind::WebSocket => {
                let transport = WsTransport::connect(&config.url, &config.headers).await?;
                Ok(Self::WebSocket(transport))
            }
            TransportKind::LongPoll => {
                let transport =
                    PollTransport::connect(url, Duration::from_millis(config.poll_interval_ms))
                        .await?;
                Ok(Self::LongPoll(transport))
            }
        }
    }

    /// Sends one payload to the server.
    pub(crate) async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        match self {
            Self::WebSocket(transport) => transport.send(text).await,
            Self::LongPoll(transport) => transport.send(text).await,
        }
    }

    /// Receives the next payload. `None` means the remote closed the connection.
    pub(crate) async fn next(&mut self) -> Option<Result<String, NetworkError>> {
        match self {
            Self::WebSocket(transport) => transport.next().await,
            Self::LongPoll(transport) => transport.next().await,
        }
    }

    /// Best-effort graceful shutdown of the underlying connection.
    pub(crate) async fn shutdown(&mut self) {
        if let Self::WebSocket(transport) = self {
            transport.shutdown().await;
        }
    }
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug)]
pub(crate) struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    async fn connect(url: &str, headers: &[(String, String)]) -> Result<Self, NetworkError> {
        let mut request = url.into_client_request()?;
        let req_headers = request.headers_mut();

        for (key, value) in headers {
            let header_name: HeaderName = key
                .parse()
                .map_err(|_| NetworkError::Transport(format!("invalid header name '{key}'")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| NetworkError::Transport(format!("invalid header value for '{key}'")))?;
            req_headers.insert(header_name, header_value);
        }

        let (stream, _response) = connect_async(request).await?;
        Ok(Self { stream })
    }

    async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<String, NetworkError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    tracing::trace!("Received message: {text}");
                    return Some(Ok(text.to_string()));
                }
                Ok(Message::Binary(data)) => {
                    tracing::trace!("Received message <binary> {} bytes", data.len());
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()));
                }
                Ok(Message::Ping(payload)) => {
                    tracing::trace!("Received ping frame");
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Pong(_)) => {
                    tracing::trace!("Received pong frame");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!("Received close frame - terminating");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn shutdown(&mut self) {
        // The remote may already be gone; a failed close frame is not an error.
        let _ = self.stream.close(None).await;
    }
}

/// Long-poll fallback transport over reqwest.
///
/// Inbound: GET on the endpoint returns a JSON array of queued message objects,
/// with the server holding the request until data is available or its own wait
/// expires. Outbound: POST with the message as the JSON body.
#[derive(Debug)]
pub(crate) struct PollTransport {
    client: reqwest::Client,
    endpoint: Url,
    poll_interval: Duration,
    buffered: VecDeque<String>,
}

impl PollTransport {
    async fn connect(endpoint: Url, poll_interval: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder().build()?;
        let mut transport = Self {
            client,
            endpoint,
            poll_interval,
            buffered: VecDeque::new(),
        };

        // A client handle alone proves nothing about reachability; the first
        // poll round is the connectivity check, and an unreachable endpoint
        // counts as a failed connection attempt.
        let batch = transport.poll_once().await?;
        transport.buffered.extend(batch);

        Ok(transport)
    }

    async fn send(&mut self, text: String) -> Result<(), NetworkError> {
        self.client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(text)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<String, NetworkError>> {
        loop {
            if let Some(text) = self.buffered.pop_front() {
                return Some(Ok(text));
            }

            let batch = match self.poll_once().await {
                Ok(batch) => batch,
                Err(e) => return Some(Err(e)),
            };

            if batch.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            } else {
                self.buffered.extend(batch);
            }
        }
    }

    async fn poll_once(&self) -> Result<Vec<String>, NetworkError> {
        let values: Vec<serde_json::Value> = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(values.iter().map(ToString::to_string).collect())
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
    #[case("ws://127.0.0.1:9001/live", TransportKind::WebSocket)]
    #[case("wss://example.com/live", TransportKind::WebSocket)]
    #[case("http://127.0.0.1:9001/poll", TransportKind::LongPoll)]
    #[case("https://example.com/poll", TransportKind::LongPoll)]
    fn test_kind_selection(#[case] url: &str, #[case] expected: TransportKind) {
        let url = Url::parse(url).unwrap();
        assert_eq!(TransportKind::for_url(&url).unwrap(), expected);
    }

    #[rstest]
    fn test_unsupported_scheme_rejected() {
        let url = Url::parse("ftp://example.com/live").unwrap();
        assert!(matches!(
            TransportKind::for_url(&url),
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_unparseable_url() {
        let config = ChannelConfig::new("not a url");
        assert!(matches!(
            Transport::connect(&config).await,
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_longpoll_connect_probes_endpoint() {
        // Nothing listens on this port; the initial poll round must fail the
        // connect rather than produce a transport that was never reachable.
        let config = ChannelConfig::new("http://127.0.0.1:9/poll");
        assert!(matches!(
            Transport::connect(&config).await,
            Err(NetworkError::Transport(_))
        ));
    }
}
