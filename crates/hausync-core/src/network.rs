// ── Transport selection ──
//
// Picks which configured server address to talk to, classifies the host
// link, and builds scheme-correct URLs. Reachability of the local address
// is probed only when the link changes, never on a timer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::CoreError;
use crate::model::{ConnectionMode, LinkType, NetworkStatus};

// ── Address helpers ─────────────────────────────────────────────────

/// Pick the address to use for `mode`.
///
/// `local_reachable` is the outcome of the most recent probe of `local`.
pub fn best_address<'a>(
    local: Option<&'a str>,
    remote: Option<&'a str>,
    mode: ConnectionMode,
    local_reachable: bool,
) -> Option<&'a str> {
    match mode {
        ConnectionMode::Local => local,
        ConnectionMode::Remote => remote,
        ConnectionMode::Automatic => {
            if local_reachable && local.is_some() {
                local
            } else {
                remote.or(local)
            }
        }
    }
}

/// Strip an optional `scheme://` prefix and any path from an address.
fn split_scheme(address: &str) -> (Option<&str>, &str) {
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, address),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    (scheme, authority)
}

/// Host part of an authority, without port or IPv6 brackets.
fn host_of(authority: &str) -> &str {
    if let Some(stripped) = authority.strip_prefix('[') {
        return stripped.split(']').next().unwrap_or(stripped);
    }
    // A bare IPv6 literal has several colons and no port.
    if authority.matches(':').count() > 1 {
        return authority;
    }
    authority.split(':').next().unwrap_or(authority)
}

fn is_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

fn is_local_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Whether talking to `address` should use TLS.
///
/// An explicit scheme wins. Otherwise local-looking hosts (RFC 1918,
/// loopback, link-local, IPv6 ULA, `localhost`, `*.local`) use plaintext
/// and everything else uses TLS.
pub fn uses_tls(address: &str) -> bool {
    let (scheme, authority) = split_scheme(address);
    match scheme.map(str::to_ascii_lowercase).as_deref() {
        Some("https" | "wss") => return true,
        Some("http" | "ws") => return false,
        _ => {}
    }

    let host = host_of(authority);
    let local = match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => is_local_v4(ip),
        Ok(IpAddr::V6(ip)) => is_local_v6(ip),
        Err(_) => {
            let host = host.to_ascii_lowercase();
            host == "localhost" || host.ends_with(".local")
        }
    };
    !local
}

fn build_url(address: &str, secure: &str, plain: &str, suffix: &str) -> Result<Url, CoreError> {
    let (_, authority) = split_scheme(address);
    if authority.is_empty() {
        return Err(CoreError::NotConfigured);
    }
    let scheme = if uses_tls(address) { secure } else { plain };
    let suffix = suffix.trim_start_matches('/');
    Url::parse(&format!("{scheme}://{authority}/{suffix}")).map_err(|e| CoreError::Config {
        message: format!("invalid controller address {address:?}: {e}"),
    })
}

/// `http(s)://{address}/{suffix}`
pub fn http_url(address: &str, suffix: &str) -> Result<Url, CoreError> {
    build_url(address, "https", "http", suffix)
}

/// `ws(s)://{address}/{suffix}`
pub fn ws_url(address: &str, suffix: &str) -> Result<Url, CoreError> {
    build_url(address, "wss", "ws", suffix)
}

// ── TransportSelector ───────────────────────────────────────────────

/// Holds the configured addresses, the host link status, and the most
/// recent local reachability probe.
pub struct TransportSelector {
    local: Option<String>,
    remote: Option<String>,
    http: reqwest::Client,
    probe_timeout: Duration,
    status: watch::Sender<NetworkStatus>,
    local_reachable: watch::Sender<Option<bool>>,
}

impl TransportSelector {
    pub fn new(
        local: Option<String>,
        remote: Option<String>,
        http: reqwest::Client,
        probe_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(NetworkStatus::Unknown);
        let (local_reachable, _) = watch::channel(None);
        Self {
            local: local.filter(|a| !a.trim().is_empty()),
            remote: remote.filter(|a| !a.trim().is_empty()),
            http,
            probe_timeout,
            status,
            local_reachable,
        }
    }

    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }

    // ── Link status ──────────────────────────────────────────────────

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Record a link observation. Returns `true` if the status changed.
    pub fn report_link(&self, link: LinkType) -> bool {
        let next = NetworkStatus::from(link);
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(?link, status = ?next, "network status changed");
        }
        changed
    }

    /// Back to `Unknown`; the probe result is forgotten.
    pub fn reset(&self) {
        self.status.send_replace(NetworkStatus::Unknown);
        self.local_reachable.send_replace(None);
    }

    // ── Probing ──────────────────────────────────────────────────────

    /// Outcome of the most recent local probe, if any ran.
    pub fn local_reachable(&self) -> Option<bool> {
        *self.local_reachable.borrow()
    }

    /// Probe the local address now and remember the result.
    pub async fn probe_local(&self) -> Option<bool> {
        let local = self.local.as_deref()?;
        let reachable = match http_url(local, "") {
            Ok(url) => hausync_api::http::probe(&self.http, url, self.probe_timeout).await,
            Err(_) => false,
        };
        info!(address = local, reachable, "local reachability probed");
        self.local_reachable.send_replace(Some(reachable));
        Some(reachable)
    }

    /// Re-probe after every link change, once the link has been quiet
    /// for `debounce`.
    pub async fn run_probe_loop(&self, cancel: CancellationToken, debounce: Duration) {
        let mut rx = self.status.subscribe();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            // Collapse bursts of link events into a single probe.
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    () = tokio::time::sleep(debounce) => break,
                }
            }

            if *rx.borrow_and_update() == NetworkStatus::Disconnected {
                self.local_reachable.send_replace(Some(false));
                continue;
            }
            let _ = self.probe_local().await;
        }
    }

    // ── Selection ────────────────────────────────────────────────────

    pub fn best_address(&self, mode: ConnectionMode) -> Option<&str> {
        best_address(
            self.local(),
            self.remote(),
            mode,
            self.local_reachable().unwrap_or(false),
        )
    }

    /// Ordered failover list: best address first, then the other one.
    ///
    /// `Local` and `Remote` modes pin to a single address.
    pub fn candidates(&self, mode: ConnectionMode) -> Vec<String> {
        let Some(best) = self.best_address(mode) else {
            return Vec::new();
        };
        let mut out = vec![best.to_owned()];
        if mode == ConnectionMode::Automatic {
            for other in [self.local(), self.remote()].into_iter().flatten() {
                if other != best {
                    out.push(other.to_owned());
                }
            }
        }
        out
    }
}
