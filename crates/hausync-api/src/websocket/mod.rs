//! Realtime socket: connect, key/authenticate handshake, binary value
//! updates.
//!
//! The controller speaks a small text protocol over an RFC 6455 socket
//! before it starts pushing binary state tables:
//!
//! ```text
//! client                                 controller
//!   | -- jdev/sys/getkey ------------------> |
//!   | <------------------ LL { value: key }  |
//!   | -- authenticate/{key response} ------> |
//!   | <------------------ LL { Code: 200 }   |
//!   | -- jdev/sps/enablebinstatusupdate ---> |
//!   | <========== binary value tables ====== |
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use hausync_api::websocket::RealtimeSocket;
//!
//! let socket = RealtimeSocket::connect(&url, &creds, AuthScheme::Plain, timeout, |_| {}).await?;
//! socket.run(&cancel, Duration::from_secs(60), |states| {
//!     for s in states {
//!         println!("{} = {}", s.id, s.value);
//!     }
//! }).await?;
//! ```

pub mod codec;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use url::Url;

use crate::auth::{AuthScheme, Credentials};
use crate::error::Error;
use crate::http::models::{LlResponse, parse_envelope};

pub use codec::{Frame, MessageKind, ValueState};

// ── Protocol constants ───────────────────────────────────────────────

/// Upgrade path appended to the controller address.
pub const WS_PATH: &str = "ws/rfc6455";

/// Sub-protocol token the controller requires on the upgrade request.
pub const SUBPROTOCOL: &str = "remotecontrol";

pub const GET_KEY: &str = "jdev/sys/getkey";
pub const AUTHENTICATE: &str = "authenticate";
pub const ENABLE_STATUS_UPDATES: &str = "jdev/sps/enablebinstatusupdate";
pub const KEEPALIVE: &str = "keepalive";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake milestones reported while [`RealtimeSocket::connect`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// The controller answered `getkey`; authentication is in flight.
    KeyReceived,
    /// The controller accepted the key response.
    Authenticated,
}

// ── RealtimeSocket ───────────────────────────────────────────────────

/// An authenticated realtime socket with binary status updates enabled.
///
/// Owned by exactly one receive loop; it is consumed by [`run`](Self::run).
pub struct RealtimeSocket {
    stream: WsStream,
    url: Url,
}

impl RealtimeSocket {
    /// Open the socket and run the key/authenticate handshake.
    ///
    /// `timeout` bounds the whole sequence (TCP connect, upgrade, and both
    /// round-trips). A non-`200` answer to `authenticate` is returned as
    /// [`Error::Authentication`], which callers must not fail over on.
    pub async fn connect<F>(
        url: &Url,
        credentials: &Credentials,
        scheme: AuthScheme,
        timeout: Duration,
        mut on_phase: F,
    ) -> Result<Self, Error>
    where
        F: FnMut(HandshakePhase),
    {
        tokio::time::timeout(timeout, handshake(url, credentials, scheme, &mut on_phase))
            .await
            .unwrap_or(Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }))
    }

    /// The URL this socket is connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Read frames until the socket drops or `cancel` fires.
    ///
    /// Decoded value-state tables are handed to `on_values`. Sends a
    /// `keepalive` every `keepalive` interval (zero disables it). Returns
    /// `Ok(())` on a clean close or cancellation, [`Error::OutOfService`]
    /// when the controller announces a restart.
    pub async fn run<F>(
        mut self,
        cancel: &CancellationToken,
        keepalive: Duration,
        mut on_values: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Vec<ValueState>),
    {
        let mut ticker = (!keepalive.is_zero()).then(|| {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + keepalive,
                keepalive,
            );
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = self.stream.close(None).await;
                    return Ok(());
                }
                () = next_tick(ticker.as_mut()) => {
                    trace!("sending keepalive");
                    send_text(&mut self.stream, KEEPALIVE).await?;
                }
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(Message::Binary(data))) => match codec::decode(&data) {
                            Ok(Frame::ValueStates(states)) => {
                                trace!(count = states.len(), "value-state table received");
                                if !states.is_empty() {
                                    on_values(states);
                                }
                            }
                            Ok(Frame::Other(MessageKind::OutOfService)) => {
                                info!("controller announced out-of-service");
                                return Err(Error::OutOfService);
                            }
                            Ok(Frame::Other(kind)) => {
                                trace!(?kind, bytes = data.len(), "binary frame not interpreted");
                            }
                            Err(e) => {
                                debug!(error = %e, "dropping undecodable binary frame");
                            }
                        },
                        Some(Ok(Message::Text(text))) => {
                            trace!(text = %text.as_str(), "control message");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                info!(code = %cf.code, reason = %cf.reason, "realtime close frame received");
                            } else {
                                info!("realtime close frame received (no payload)");
                            }
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Ping / Pong / raw frames; tungstenite answers pings itself.
                        }
                        Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                        None => {
                            info!("realtime stream ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────

async fn handshake<F>(
    url: &Url,
    credentials: &Credentials,
    scheme: AuthScheme,
    on_phase: &mut F,
) -> Result<RealtimeSocket, Error>
where
    F: FnMut(HandshakePhase),
{
    info!(url = %url, "Connecting to realtime socket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
    let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUBPROTOCOL);

    let (mut stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    send_text(&mut stream, GET_KEY).await?;
    let key_ll = next_ll(&mut stream).await?;
    if !key_ll.is_success() {
        return Err(Error::Handshake(format!(
            "getkey answered with code {}",
            key_ll.code
        )));
    }
    let key = key_ll
        .value_str()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Handshake("getkey returned no key".into()))?;
    debug!("realtime key received");
    on_phase(HandshakePhase::KeyReceived);

    // The command carries the credentials; it is never logged.
    let response = scheme.key_response(&key, credentials);
    send_text(&mut stream, &format!("{AUTHENTICATE}/{response}")).await?;
    let auth_ll = next_ll(&mut stream).await?;
    if !auth_ll.is_success() {
        let _ = stream.close(None).await;
        return Err(Error::Authentication {
            message: format!("realtime authenticate answered with code {}", auth_ll.code),
        });
    }
    on_phase(HandshakePhase::Authenticated);

    send_text(&mut stream, ENABLE_STATUS_UPDATES).await?;
    info!("realtime socket authenticated");

    Ok(RealtimeSocket {
        stream,
        url: url.clone(),
    })
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn send_text(stream: &mut WsStream, text: &str) -> Result<(), Error> {
    stream
        .send(Message::text(text.to_owned()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Read until the next text frame and parse it as an `LL` response.
///
/// Binary header frames and pings in between are skipped.
async fn next_ll(stream: &mut WsStream) -> Result<LlResponse, Error> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return parse_envelope(text.as_str()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                return Err(Error::WebSocketClosed { code, reason });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended during handshake".into(),
                });
            }
        }
    }
}

async fn next_tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
