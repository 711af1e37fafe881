// In-process controller double serving HTTP and the realtime socket on
// one port, the way real controllers do.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

use hausync_core::{
    AuthScheme, ConnectionMode, ControllerConfig, Credentials, DispatchSettings, FetchSettings,
    ReconnectPolicy, Timeouts,
};

pub const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

/// Mutates the served state table when a command arrives.
pub type CommandEffect = Arc<dyn Fn(&str, &str, &mut HashMap<String, f64>) + Send + Sync>;

pub struct Behavior {
    pub structure: Value,
    pub auth_code: &'static str,
    /// Answer the upgrade with 503 instead of switching protocols.
    pub reject_socket: bool,
    /// Accept this many sockets, then answer later upgrades with 503.
    pub max_sockets: Option<usize>,
    /// Answer this many upgrades with 503 before accepting any.
    pub reject_first: usize,
    /// Binary frames pushed right after status updates are enabled.
    pub push_frames: Vec<Vec<u8>>,
    /// Close the socket after pushing frames.
    pub drop_after_push: bool,
    pub key_gate: Option<Arc<Notify>>,
    pub auth_gate: Option<Arc<Notify>>,
    pub states: HashMap<String, f64>,
    pub on_command: Option<CommandEffect>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            structure: json!({ "controls": {} }),
            auth_code: "200",
            reject_socket: false,
            max_sockets: None,
            reject_first: 0,
            push_frames: Vec::new(),
            drop_after_push: false,
            key_gate: None,
            auth_gate: None,
            states: HashMap::new(),
            on_command: None,
        }
    }
}

struct Shared {
    behavior: Behavior,
    states: Mutex<HashMap<String, f64>>,
    socket_accepts: AtomicUsize,
    upgrades: AtomicUsize,
    requests: Mutex<Vec<String>>,
    commands: Mutex<Vec<(String, String)>>,
}

pub struct FakeController {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
}

impl FakeController {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            states: Mutex::new(behavior.states.clone()),
            behavior,
            socket_accepts: AtomicUsize::new(0),
            upgrades: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
        });

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(handle(tcp, Arc::clone(&accept_shared)));
            }
        });

        Self { addr, shared }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn socket_accepts(&self) -> usize {
        self.shared.socket_accepts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn set_state(&self, id: &str, value: f64) {
        self.shared.states.lock().unwrap().insert(id.to_owned(), value);
    }
}

/// An address that accepts TCP connections and never answers.
pub async fn silent_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    addr.to_string()
}

/// An address nothing listens on.
pub fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Test-speed configuration with credentials `admin` / `secret`.
pub fn config(local: Option<String>, remote: Option<String>, mode: ConnectionMode) -> ControllerConfig {
    ControllerConfig {
        local_address: local,
        remote_address: remote,
        mode,
        credentials: Credentials::new("admin", "secret"),
        auth_scheme: AuthScheme::Plain,
        timeouts: Timeouts {
            request: Duration::from_secs(2),
            structure: Duration::from_secs(2),
            probe: Duration::from_millis(500),
            connect: Duration::from_secs(2),
        },
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_attempts: 3,
        },
        fetch: FetchSettings {
            request_delay: Duration::from_millis(5),
            room_batch_size: 4,
            room_batch_delay: Duration::from_millis(5),
        },
        dispatch: DispatchSettings {
            settle_delay: Duration::from_millis(50),
            debounce_window: Duration::from_millis(100),
        },
        initial_fetch: false,
        room_poll_interval: Duration::from_millis(50),
        keepalive_interval: Duration::from_secs(60),
        probe_debounce: Duration::from_millis(20),
        ..ControllerConfig::default()
    }
}

/// A value-state frame for `(uuid string, value)` records.
pub fn value_frame(records: &[(&str, f64)]) -> Vec<u8> {
    let mut out = vec![2, 0, 0, 0, 0, 0, 0, 0];
    for (id, value) in records {
        out.extend_from_slice(uuid::Uuid::parse_str(id).unwrap().as_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

// ── Connection handling ─────────────────────────────────────────────

async fn handle(mut tcp: TcpStream, shared: Arc<Shared>) {
    let mut buf = vec![0u8; 8192];
    let head_len = loop {
        let Ok(n) = tcp.peek(&mut buf).await else { return };
        if n == 0 {
            return;
        }
        if let Some(pos) = buf[..n].windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if n == buf.len() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();

    let is_upgrade = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .any(|(k, v)| k.eq_ignore_ascii_case("upgrade") && v.trim().eq_ignore_ascii_case("websocket"));

    if is_upgrade {
        handle_socket(tcp, shared).await;
    } else {
        let mut consumed = vec![0u8; head_len];
        if tcp.read_exact(&mut consumed).await.is_err() {
            return;
        }
        handle_http(tcp, &head, &shared).await;
    }
}

async fn handle_http(mut tcp: TcpStream, head: &str, shared: &Shared) {
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();
    shared.requests.lock().unwrap().push(format!("{method} {path}"));

    let authorized = head.lines().filter_map(|l| l.split_once(':')).any(|(k, v)| {
        k.eq_ignore_ascii_case("authorization") && v.trim() == BASIC_AUTH
    });

    let (status, body) = if method == "HEAD" {
        (200, String::new())
    } else if !authorized {
        (401, String::new())
    } else if path == "/data/LoxAPP3.json" {
        (200, shared.behavior.structure.to_string())
    } else if let Some(rest) = path.strip_prefix("/jdev/sps/io/") {
        let (id, cmd) = rest.split_once('/').unwrap_or((rest, ""));
        (200, io_response(shared, id, cmd))
    } else {
        (404, String::new())
    };

    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        if method == "HEAD" { "" } else { body.as_str() }
    );
    let _ = tcp.write_all(response.as_bytes()).await;
    let _ = tcp.shutdown().await;
}

fn io_response(shared: &Shared, id: &str, cmd: &str) -> String {
    let control = format!("jdev/sps/io/{id}/{cmd}");
    if cmd == "state" {
        let value = shared.states.lock().unwrap().get(id).copied().unwrap_or(0.0);
        return json!({ "LL": { "control": control, "value": value.to_string(), "Code": "200" } })
            .to_string();
    }

    shared
        .commands
        .lock()
        .unwrap()
        .push((id.to_owned(), cmd.to_owned()));
    if let Some(effect) = &shared.behavior.on_command {
        effect(id, cmd, &mut shared.states.lock().unwrap());
    }
    json!({ "LL": { "control": control, "value": "1", "Code": "200" } }).to_string()
}

async fn handle_socket(mut tcp: TcpStream, shared: Arc<Shared>) {
    let behavior = &shared.behavior;
    let upgrade = shared.upgrades.fetch_add(1, Ordering::SeqCst);
    let exhausted = behavior
        .max_sockets
        .is_some_and(|max| shared.socket_accepts.load(Ordering::SeqCst) >= max);
    if behavior.reject_socket || exhausted || upgrade < behavior.reject_first {
        let _ = tcp
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
        let _ = tcp.shutdown().await;
        return;
    }

    shared.socket_accepts.fetch_add(1, Ordering::SeqCst);
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(
        tcp,
        |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            resp.headers_mut()
                .insert("sec-websocket-protocol", HeaderValue::from_static("remotecontrol"));
            Ok(resp)
        },
    )
    .await
    else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let text = text.as_str().to_owned();

        if text == "jdev/sys/getkey" {
            if let Some(gate) = &behavior.key_gate {
                gate.notified().await;
            }
            let reply = json!({ "LL": { "control": text, "value": "41424344", "Code": "200" } });
            if ws.send(Message::text(reply.to_string())).await.is_err() {
                return;
            }
        } else if text.starts_with("authenticate/") {
            if let Some(gate) = &behavior.auth_gate {
                gate.notified().await;
            }
            let reply = json!({ "LL": { "control": "authenticate", "value": "", "Code": behavior.auth_code } });
            if ws.send(Message::text(reply.to_string())).await.is_err() {
                return;
            }
            if behavior.auth_code != "200" {
                let _ = ws.close(None).await;
                return;
            }
        } else if text == "jdev/sps/enablebinstatusupdate" {
            let reply = json!({ "LL": { "control": text, "value": "1", "Code": "200" } });
            if ws.send(Message::text(reply.to_string())).await.is_err() {
                return;
            }
            for frame in &behavior.push_frames {
                if ws.send(Message::binary(frame.clone())).await.is_err() {
                    return;
                }
            }
            if behavior.drop_after_push {
                let _ = ws.close(None).await;
                return;
            }
        }
    }
}
