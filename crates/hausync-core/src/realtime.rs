// ── Realtime channel ──
//
// Drives the push channel through its lifecycle:
//
//   Disconnected → Connecting → Authenticating → Connected
//                      ↓              ↓              ↓
//                   Error(reason) ─── backoff ──→ Connecting …
//
// One supervisor task owns the socket. When the receive loop ends for any
// reason other than cancellation it schedules bounded reconnect attempts
// (delay = base × attempt, capped), then gives up and stays disconnected.
// `Connected` is published only once a catalog is in place.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hausync_api::websocket::{HandshakePhase, RealtimeSocket, WS_PATH};
use hausync_api::{AuthScheme, Credentials, HttpClient, TransportConfig};

use crate::catalog::Catalog;
use crate::error::CoreError;
use crate::fetcher::BatchFetcher;
use crate::model::{ConnectionMode, ConnectionState};
use crate::network::{TransportSelector, http_url, ws_url};
use crate::store::StateStore;

// ── ReconnectPolicy ─────────────────────────────────────────────────

/// Bounded linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect `attempt` (1-based): `base × attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt.max(1))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// The full schedule, one entry per allowed attempt.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt))
    }
}

// ── RealtimeContext ─────────────────────────────────────────────────

/// Everything the realtime supervisor shares with the controller facade.
pub struct RealtimeContext {
    pub credentials: Credentials,
    pub scheme: AuthScheme,
    pub mode: ConnectionMode,
    pub transport: TransportConfig,
    pub connect_timeout: Duration,
    pub structure_timeout: Duration,
    pub keepalive: Duration,
    pub policy: ReconnectPolicy,
    pub fetcher: BatchFetcher,
    /// Bulk-load every state once per session.
    pub initial_fetch: bool,
    pub probe_debounce: Duration,
    pub selector: Arc<TransportSelector>,
    pub store: Arc<StateStore>,
    pub state: watch::Sender<ConnectionState>,
    /// HTTP client bound to the address the channel last connected to.
    pub http: ArcSwapOption<HttpClient>,
    /// Catalog of the current connection.
    pub catalog: ArcSwapOption<Catalog>,
}

impl RealtimeContext {
    pub fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!(from = %current, to = %next, "connection state");
                *current = next;
                true
            }
        });
    }

    /// Build an HTTP client for `address`.
    pub fn http_client(&self, address: &str) -> Result<HttpClient, CoreError> {
        let base = http_url(address, "")?;
        Ok(HttpClient::new(
            base,
            Some(self.credentials.clone()),
            &self.transport,
        )?)
    }

    /// Make `address` the active HTTP target.
    pub fn activate(&self, address: &str) -> Result<Arc<HttpClient>, CoreError> {
        let client = Arc::new(self.http_client(address)?);
        self.http.store(Some(Arc::clone(&client)));
        Ok(client)
    }

    /// Download and parse the structure document, replacing the catalog.
    pub async fn load_structure(&self, http: &HttpClient) -> Result<Arc<Catalog>, CoreError> {
        let document = http.fetch_structure(self.structure_timeout).await?;
        let catalog = Arc::new(Catalog::load(document)?);
        info!(
            controls = catalog.all_controls().len(),
            rooms = catalog.rooms().len(),
            "structure catalog loaded"
        );
        self.catalog.store(Some(Arc::clone(&catalog)));
        Ok(catalog)
    }

    /// Rebind HTTP to `address` and make sure a catalog is loaded.
    pub async fn bind(&self, address: &str) -> Result<(Arc<HttpClient>, Arc<Catalog>), CoreError> {
        let http = self.activate(address)?;
        let catalog = match self.catalog.load_full() {
            Some(catalog) => catalog,
            None => self.load_structure(&http).await?,
        };
        Ok((http, catalog))
    }

    /// Open and authenticate a socket to one address, reporting handshake
    /// progress on the connection state.
    ///
    /// Stops at `Authenticating`; the caller publishes `Connected` once
    /// the catalog is loaded.
    pub async fn open(&self, address: &str) -> Result<RealtimeSocket, CoreError> {
        let url = ws_url(address, WS_PATH)?;
        self.set_state(ConnectionState::Connecting);

        let socket = RealtimeSocket::connect(
            &url,
            &self.credentials,
            self.scheme,
            self.connect_timeout,
            |phase| match phase {
                HandshakePhase::KeyReceived => self.set_state(ConnectionState::Authenticating),
                HandshakePhase::Authenticated => debug!(address, "realtime socket authenticated"),
            },
        )
        .await?;
        Ok(socket)
    }

    /// Try each candidate in order. Authentication failures stop the walk;
    /// transient failures move on to the next address.
    pub async fn open_any(&self) -> Result<(RealtimeSocket, String), CoreError> {
        let candidates = self.selector.candidates(self.mode);
        if candidates.is_empty() {
            return Err(CoreError::NotConfigured);
        }

        let mut last = None;
        for address in candidates {
            match self.open(&address).await {
                Ok(socket) => return Ok((socket, address)),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(address = %address, error = %e, "realtime candidate failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(CoreError::NotConfigured))
    }
}

// ── Session setup ───────────────────────────────────────────────────

/// Start the background work every established session runs: the bulk
/// state load (when enabled) and the link-change probe loop.
///
/// Both tasks are children of `cancel`.
pub fn start_session(
    ctx: &RealtimeContext,
    http: Arc<HttpClient>,
    catalog: &Catalog,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(2);

    let selector = Arc::clone(&ctx.selector);
    let probe_cancel = cancel.child_token();
    let debounce = ctx.probe_debounce;
    handles.push(tokio::spawn(async move {
        selector.run_probe_loop(probe_cancel, debounce).await;
    }));

    if ctx.initial_fetch {
        handles.push(tokio::spawn(initial_load_task(
            ctx.fetcher,
            http,
            catalog.state_ids(),
            Arc::clone(&ctx.store),
            cancel.child_token(),
        )));
    }
    handles
}

async fn initial_load_task(
    fetcher: BatchFetcher,
    http: Arc<HttpClient>,
    ids: Vec<String>,
    store: Arc<StateStore>,
    cancel: CancellationToken,
) {
    let report = fetcher.fetch_all(&*http, &ids, &store, &cancel).await;
    if !report.errors.is_empty() {
        warn!(failed = report.errors.len(), "initial state load had failures");
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// Own the realtime socket until `cancel` fires or reconnects run out.
///
/// With `socket == None` the supervisor starts in backoff, as after a
/// failed initial connect; the first connection it establishes then runs
/// [`start_session`]. Session tasks are joined before this returns.
pub async fn supervise(
    ctx: Arc<RealtimeContext>,
    socket: Option<RealtimeSocket>,
    cancel: CancellationToken,
) {
    let mut session = Vec::new();
    reconnect_loop(&ctx, socket, &cancel, &mut session).await;
    join_all(session).await;
}

async fn reconnect_loop(
    ctx: &Arc<RealtimeContext>,
    mut socket: Option<RealtimeSocket>,
    cancel: &CancellationToken,
    session: &mut Vec<JoinHandle<()>>,
) {
    let mut session_started = socket.is_some();
    let mut attempt: u32 = 0;

    loop {
        if let Some(sock) = socket.take() {
            attempt = 0;
            let store = Arc::clone(&ctx.store);
            let result = sock
                .run(cancel, ctx.keepalive, |states| {
                    store.update_batch(states.into_iter().map(|s| (s.id, s.value)));
                })
                .await;

            if cancel.is_cancelled() {
                return;
            }
            let reason = match result {
                Ok(()) => "realtime socket closed".to_owned(),
                Err(e) => CoreError::from(e).to_string(),
            };
            warn!(reason = %reason, "realtime channel lost");
            ctx.set_state(ConnectionState::Error(reason));
        }

        attempt += 1;
        if attempt > ctx.policy.max_attempts {
            info!(
                attempts = ctx.policy.max_attempts,
                "realtime reconnect attempts exhausted"
            );
            ctx.set_state(ConnectionState::Disconnected);
            return;
        }

        let delay = ctx.policy.delay_for(attempt);
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling realtime reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            opened = ctx.open_any() => opened,
        };
        let (sock, address) = match opened {
            Ok(found) => found,
            Err(e) if e.is_auth() => {
                warn!(error = %e, "realtime reconnect rejected; giving up");
                ctx.set_state(ConnectionState::Error(e.to_string()));
                return;
            }
            Err(e) => {
                ctx.set_state(ConnectionState::Error(e.to_string()));
                continue;
            }
        };

        let bound = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            bound = ctx.bind(&address) => bound,
        };
        match bound {
            Ok((http, catalog)) => {
                info!(address = %address, "realtime channel re-established");
                if !session_started {
                    session.extend(start_session(ctx, http, &catalog, cancel));
                    session_started = true;
                }
                ctx.set_state(ConnectionState::Connected);
                socket = Some(sock);
            }
            Err(e) if e.is_auth() => {
                warn!(error = %e, "structure request rejected; giving up");
                ctx.set_state(ConnectionState::Error(e.to_string()));
                return;
            }
            Err(e) => {
                warn!(address = %address, error = %e, "structure load after reconnect failed");
                ctx.set_state(ConnectionState::Error(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(7),
            max_attempts: 6,
        };
        let schedule: Vec<Duration> = policy.schedule().collect();

        assert_eq!(schedule.len(), 6);
        assert_eq!(schedule[0], Duration::from_secs(2));
        assert_eq!(schedule[1], Duration::from_secs(4));
        assert_eq!(schedule[2], Duration::from_secs(6));
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        assert!(schedule.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(schedule[5], Duration::from_secs(7));
    }

    #[test]
    fn backoff_survives_overflow() {
        let policy = ReconnectPolicy {
            base_delay: Duration::MAX,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
        assert_eq!(policy.delay_for(0), Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_means_no_schedule() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.schedule().count(), 0);
    }
}
