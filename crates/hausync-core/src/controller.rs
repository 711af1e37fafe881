// ── Controller facade ──
//
// The one entry point for hosts. Owns the store, the catalog, the
// transport selector and the realtime supervisor, and runs every
// background task under a per-connection cancellation token that
// `disconnect` cancels and joins.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hausync_api::HttpClient;
use hausync_api::websocket::RealtimeSocket;

use crate::catalog::Catalog;
use crate::command::{Command, CommandAck, CommandDispatcher};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::fetcher::{BatchFetcher, FetchReport};
use crate::model::{ConnectionMode, ConnectionState, DeviceState, LinkType, NetworkStatus};
use crate::network::TransportSelector;
use crate::realtime::{self, RealtimeContext};
use crate::store::{StateStore, StateStream};

/// Background poll of the focused room.
struct RoomPoll {
    room_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Nothing is global: two
/// controllers built from two configs are fully independent.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    link: Arc<RealtimeContext>,
    fetcher: BatchFetcher,
    dispatcher: CommandDispatcher,
    /// Token for the current connection; replaced on every connect.
    cancel_child: Mutex<CancellationToken>,
    room_poll: Mutex<Option<RoomPoll>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller. Does NOT connect; call
    /// [`connect()`](Self::connect) to start the channel and background tasks.
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let transport = config.transport();
        let probe_client = transport.with_timeout(config.timeouts.probe).build_client()?;

        let selector = Arc::new(TransportSelector::new(
            config.local_address.clone(),
            config.remote_address.clone(),
            probe_client,
            config.timeouts.probe,
        ));
        let store = Arc::new(StateStore::new());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let link = Arc::new(RealtimeContext {
            credentials: config.credentials.clone(),
            scheme: config.auth_scheme,
            mode: config.mode,
            transport,
            connect_timeout: config.timeouts.connect,
            structure_timeout: config.timeouts.structure,
            keepalive: config.keepalive_interval,
            policy: config.reconnect,
            fetcher: BatchFetcher::new(config.fetch),
            initial_fetch: config.initial_fetch,
            probe_debounce: config.probe_debounce,
            selector,
            store: Arc::clone(&store),
            state,
            http: ArcSwapOption::empty(),
            catalog: ArcSwapOption::empty(),
        });

        Ok(Self {
            inner: Arc::new(ControllerInner {
                fetcher: BatchFetcher::new(config.fetch),
                dispatcher: CommandDispatcher::new(store, config.dispatch),
                config,
                link,
                cancel_child: Mutex::new(CancellationToken::new()),
                room_poll: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.link.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the best available address.
    ///
    /// Walks the candidate list (best address first). Authentication
    /// failures and malformed structure documents stop immediately;
    /// transient failures move on to the next candidate. When every
    /// candidate fails the state becomes `Error`, a bounded reconnect is
    /// scheduled, and `ConnectionFailed` is returned.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.stop_tasks().await;

        let link = &self.inner.link;
        let config = &self.inner.config;

        if !link.selector.is_configured() {
            link.set_state(ConnectionState::Error(CoreError::NotConfigured.to_string()));
            return Err(CoreError::NotConfigured);
        }
        if link.selector.status() == NetworkStatus::Disconnected {
            link.set_state(ConnectionState::Error(
                CoreError::NetworkUnavailable.to_string(),
            ));
            return Err(CoreError::NetworkUnavailable);
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel_child.lock().await = cancel.clone();

        if config.mode == ConnectionMode::Automatic && link.selector.local_reachable().is_none() {
            let _ = link.selector.probe_local().await;
        }

        link.set_state(ConnectionState::Connecting);
        let mut last_err = None;
        let mut established = None;

        for address in link.selector.candidates(config.mode) {
            match self.try_candidate(&address).await {
                Ok(found) => {
                    info!(address = %address, "controller reachable");
                    established = Some(found);
                    break;
                }
                Err(e) if e.is_auth() || matches!(e, CoreError::Structure(_) | CoreError::Config { .. }) => {
                    warn!(address = %address, error = %e, "connect aborted");
                    link.set_state(ConnectionState::Error(e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "candidate failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        let mut handles = self.inner.task_handles.lock().await;

        let Some((socket, http, catalog)) = established else {
            let reason = match last_err {
                Some(CoreError::ConnectionFailed(reason)) => reason,
                Some(other) => other.to_string(),
                None => CoreError::NotConfigured.to_string(),
            };
            link.set_state(ConnectionState::Error(reason.clone()));
            if config.realtime_enabled {
                handles.push(tokio::spawn(realtime::supervise(
                    Arc::clone(link),
                    None,
                    cancel.child_token(),
                )));
            }
            return Err(CoreError::ConnectionFailed(reason));
        };

        link.http.store(Some(Arc::clone(&http)));
        link.catalog.store(Some(Arc::clone(&catalog)));
        link.set_state(ConnectionState::Connected);

        handles.extend(realtime::start_session(link, http, &catalog, &cancel));
        if let Some(socket) = socket {
            handles.push(tokio::spawn(realtime::supervise(
                Arc::clone(link),
                Some(socket),
                cancel.child_token(),
            )));
        }

        info!("connected to controller");
        Ok(())
    }

    /// Open the socket (when enabled) and load the structure from one address.
    async fn try_candidate(
        &self,
        address: &str,
    ) -> Result<(Option<RealtimeSocket>, Arc<HttpClient>, Arc<Catalog>), CoreError> {
        let link = &self.inner.link;

        let socket = if self.inner.config.realtime_enabled {
            Some(link.open(address).await?)
        } else {
            None
        };

        let http = Arc::new(link.http_client(address)?);
        let document = http
            .fetch_structure(self.inner.config.timeouts.structure)
            .await?;
        let catalog = Arc::new(Catalog::load(document)?);
        debug!(
            controls = catalog.all_controls().len(),
            rooms = catalog.rooms().len(),
            "structure catalog loaded"
        );

        Ok((socket, http, catalog))
    }

    /// Disconnect from the controller.
    ///
    /// Cancels and joins every background task, clears the state table and
    /// catalog, and resets the observable states.
    pub async fn disconnect(&self) {
        self.stop_tasks().await;

        let link = &self.inner.link;
        link.store.clear();
        link.catalog.store(None);
        link.http.store(None);
        link.selector.reset();
        link.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    async fn stop_tasks(&self) {
        {
            let mut token = self.inner.cancel_child.lock().await;
            token.cancel();
            *token = CancellationToken::new();
        }

        if let Some(poll) = self.inner.room_poll.lock().await.take() {
            poll.cancel.cancel();
            let _ = poll.handle.await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.dispatcher.drain().await;
    }

    // ── Observation ──────────────────────────────────────────────────

    /// The catalog of the current connection, if one has been loaded.
    pub fn structure(&self) -> Option<Arc<Catalog>> {
        self.inner.link.catalog.load_full()
    }

    pub fn state(&self, id: &str) -> Option<DeviceState> {
        self.inner.link.store.get(id)
    }

    /// On/off for a state id, or for a control via its `active` state.
    pub fn is_on(&self, id: &str) -> bool {
        let target = self
            .structure()
            .and_then(|catalog| catalog.control(id))
            .and_then(|control| control.state("active").map(str::to_owned));
        self.inner
            .link
            .store
            .is_on(target.as_deref().unwrap_or(id))
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.link.state.subscribe()
    }

    pub fn network_status(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.link.selector.subscribe_status()
    }

    pub fn subscribe_states(&self) -> StateStream {
        self.inner.link.store.subscribe()
    }

    /// Feed a host link observation. Returns `true` if the status changed.
    pub fn report_link(&self, link: LinkType) -> bool {
        self.inner.link.selector.report_link(link)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// HTTP client for the active address, or the best configured one
    /// when no connection has been made yet.
    fn http(&self) -> Result<Arc<HttpClient>, CoreError> {
        let link = &self.inner.link;
        if link.selector.status() == NetworkStatus::Disconnected {
            return Err(CoreError::NetworkUnavailable);
        }
        if let Some(http) = link.http.load_full() {
            return Ok(http);
        }
        let address = link
            .selector
            .best_address(self.inner.config.mode)
            .ok_or(CoreError::NotConfigured)?
            .to_owned();
        link.activate(&address)
    }

    pub async fn send_command(
        &self,
        control_id: &str,
        command: Command,
    ) -> Result<CommandAck, CoreError> {
        let http = self.http()?;
        let control = self.structure().and_then(|c| c.control(control_id));
        let cancel = self.inner.cancel_child.lock().await.clone();
        self.inner
            .dispatcher
            .send(http, control_id, control.as_deref(), command, &cancel)
            .await
    }

    /// Debounced [`send_command`](Self::send_command): `Ok(None)` when a
    /// later call for the same control superseded this one.
    pub async fn send_debounced(
        &self,
        control_id: &str,
        command: Command,
    ) -> Result<Option<CommandAck>, CoreError> {
        let http = self.http()?;
        let control = self.structure().and_then(|c| c.control(control_id));
        let cancel = self.inner.cancel_child.lock().await.clone();
        self.inner
            .dispatcher
            .send_debounced(http, control_id, control.as_deref(), command, &cancel)
            .await
    }

    /// Read `ids` over HTTP now, in small concurrent batches.
    ///
    /// Per-id failures land in the report; only a missing link or address
    /// is an error.
    pub async fn refresh(&self, ids: &[String]) -> Result<FetchReport, CoreError> {
        let http = self.http()?;
        let cancel = self.inner.cancel_child.lock().await.clone();
        Ok(self
            .inner
            .fetcher
            .fetch_room(&*http, ids, &self.inner.link.store, &cancel)
            .await)
    }

    // ── Room focus ───────────────────────────────────────────────────

    /// Focus a room (periodic polling of its states) or clear the focus.
    ///
    /// The previous room's poll task is cancelled and joined first.
    pub async fn set_current_room(&self, room_id: Option<&str>) -> Result<(), CoreError> {
        let mut slot = self.inner.room_poll.lock().await;
        if let Some(previous) = slot.take() {
            debug!(room = %previous.room_id, "leaving room");
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }

        let Some(room_id) = room_id else {
            return Ok(());
        };

        let catalog = self
            .structure()
            .ok_or_else(|| CoreError::ConnectionFailed("not connected".into()))?;
        let ids = Catalog::state_ids_for(&catalog.controls_in_room(room_id));
        let cancel = self.inner.cancel_child.lock().await.child_token();

        info!(room = room_id, states = ids.len(), "focusing room");
        let handle = tokio::spawn(room_poll_task(
            Arc::clone(&self.inner.link),
            self.inner.fetcher,
            ids,
            self.inner.config.room_poll_interval,
            cancel.clone(),
        ));

        *slot = Some(RoomPoll {
            room_id: room_id.to_owned(),
            cancel,
            handle,
        });
        Ok(())
    }

    /// The focused room, if any.
    pub async fn current_room(&self) -> Option<String> {
        self.inner
            .room_poll
            .lock()
            .await
            .as_ref()
            .map(|p| p.room_id.clone())
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn room_poll_task(
    link: Arc<RealtimeContext>,
    fetcher: BatchFetcher,
    ids: Vec<String>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let Some(http) = link.http.load_full() else {
            debug!("no active HTTP client; skipping room poll");
            return;
        };
        let report = fetcher.fetch_room(&*http, &ids, &link.store, &cancel).await;
        if report.cancelled {
            return;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
    }
}
