// Realtime socket tests against an in-process controller double.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use url::Url;

use hausync_api::{AuthScheme, Credentials, Error, HandshakePhase, RealtimeSocket, ValueState};

// ── Helpers ─────────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

fn ll(control: &str, value: &str, code: &str) -> String {
    format!(r#"{{"LL":{{"control":"{control}","value":"{value}","Code":"{code}"}}}}"#)
}

fn value_frame(records: &[([u8; 16], f64)]) -> Vec<u8> {
    let mut out = vec![2, 0, 0, 0, 0, 0, 0, 0];
    for (id, value) in records {
        out.extend_from_slice(id);
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Accept one socket, answer the handshake with `auth_code`, then push
/// `after_auth` binary frames and close.
async fn spawn_controller(auth_code: &'static str, after_auth: Vec<Vec<u8>>) -> (Url, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::default();
    let log_task = Arc::clone(&log);

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(
            tcp,
            |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut()
                    .insert("sec-websocket-protocol", HeaderValue::from_static("remotecontrol"));
                Ok(resp)
            },
        )
        .await
        .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let text = text.as_str().to_owned();
            log_task.lock().unwrap().push(text.clone());

            if text == "jdev/sys/getkey" {
                ws.send(Message::text(ll("jdev/sys/getkey", "41424344", "200")))
                    .await
                    .unwrap();
            } else if text.starts_with("authenticate/") {
                ws.send(Message::text(ll("authenticate", "", auth_code)))
                    .await
                    .unwrap();
            } else if text == "jdev/sps/enablebinstatusupdate" {
                ws.send(Message::text(ll(&text, "1", "200"))).await.unwrap();
                for frame in &after_auth {
                    ws.send(Message::binary(frame.clone())).await.unwrap();
                }
                let _ = ws.close(None).await;
                break;
            }
        }
    });

    let url = Url::parse(&format!("ws://{addr}/ws/rfc6455")).unwrap();
    (url, log)
}

fn creds() -> Credentials {
    Credentials::new("admin", "secret")
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_order_and_phases() {
    let (url, log) = spawn_controller("200", Vec::new()).await;
    let mut phases = Vec::new();

    let socket = RealtimeSocket::connect(
        &url,
        &creds(),
        AuthScheme::Plain,
        Duration::from_secs(5),
        |p| phases.push(p),
    )
    .await
    .unwrap();

    assert_eq!(
        phases,
        vec![HandshakePhase::KeyReceived, HandshakePhase::Authenticated]
    );
    assert_eq!(socket.url(), &url);

    let cancel = CancellationToken::new();
    socket.run(&cancel, Duration::ZERO, |_| {}).await.unwrap();

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "jdev/sys/getkey".to_owned(),
            "authenticate/admin:secret".to_owned(),
            "jdev/sps/enablebinstatusupdate".to_owned(),
        ]
    );
}

#[tokio::test]
async fn test_hmac_scheme_does_not_send_plain_password() {
    let (url, log) = spawn_controller("200", Vec::new()).await;

    let socket = RealtimeSocket::connect(
        &url,
        &creds(),
        AuthScheme::HmacSha256,
        Duration::from_secs(5),
        |_| {},
    )
    .await
    .unwrap();
    socket
        .run(&CancellationToken::new(), Duration::ZERO, |_| {})
        .await
        .unwrap();

    let log = log.lock().unwrap().clone();
    let auth = log.iter().find(|c| c.starts_with("authenticate/")).unwrap();
    assert!(!auth.contains("secret"));
    assert_eq!(auth.len(), "authenticate/".len() + 64);
}

#[tokio::test]
async fn test_plain_credentials_stay_one_path_segment() {
    let (url, log) = spawn_controller("200", Vec::new()).await;
    let creds = Credentials::new("admin", "a/b c");

    let socket = RealtimeSocket::connect(&url, &creds, AuthScheme::Plain, Duration::from_secs(5), |_| {})
        .await
        .unwrap();
    socket
        .run(&CancellationToken::new(), Duration::ZERO, |_| {})
        .await
        .unwrap();

    let log = log.lock().unwrap().clone();
    assert_eq!(log[1], "authenticate/admin:a%2Fb%20c");
    assert_eq!(log[1].split('/').count(), 2);
}

#[tokio::test]
async fn test_rejected_authentication_is_auth_error() {
    let (url, _log) = spawn_controller("401", Vec::new()).await;
    let mut phases = Vec::new();

    let err = RealtimeSocket::connect(
        &url,
        &creds(),
        AuthScheme::Plain,
        Duration::from_secs(5),
        |p| phases.push(p),
    )
    .await
    .err()
    .unwrap();

    assert!(err.is_auth(), "expected auth error, got {err:?}");
    assert_eq!(phases, vec![HandshakePhase::KeyReceived]);
}

#[tokio::test]
async fn test_silent_server_times_out() {
    // Accepts TCP but never answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let url = Url::parse(&format!("ws://{addr}/ws/rfc6455")).unwrap();
    let err = RealtimeSocket::connect(
        &url,
        &creds(),
        AuthScheme::Plain,
        Duration::from_millis(200),
        |_| {},
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/ws/rfc6455")).unwrap();
    let err = RealtimeSocket::connect(&url, &creds(), AuthScheme::Plain, Duration::from_secs(2), |_| {})
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::WebSocketConnect(_)));
    assert!(err.is_transient());
}

// ── Receive loop ────────────────────────────────────────────────────

#[tokio::test]
async fn test_value_frames_are_delivered() {
    let mut id = [0u8; 16];
    id[15] = 0x01;
    let frames = vec![
        value_frame(&[(id, 1.0)]),
        value_frame(&[(id, f64::NAN)]),
        value_frame(&[(id, 0.0)]),
    ];
    let (url, _log) = spawn_controller("200", frames).await;

    let socket = RealtimeSocket::connect(&url, &creds(), AuthScheme::Plain, Duration::from_secs(5), |_| {})
        .await
        .unwrap();

    let mut received: Vec<ValueState> = Vec::new();
    socket
        .run(&CancellationToken::new(), Duration::ZERO, |states| {
            received.extend(states);
        })
        .await
        .unwrap();

    let values: Vec<f64> = received.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 0.0]);
    assert!(received.iter().all(|s| s.id == "00000000-0000-0000-0000-000000000001"));
}

#[tokio::test]
async fn test_out_of_service_ends_loop_with_error() {
    let (url, _log) = spawn_controller("200", vec![vec![5, 0, 0, 0, 0, 0, 0, 0]]).await;

    let socket = RealtimeSocket::connect(&url, &creds(), AuthScheme::Plain, Duration::from_secs(5), |_| {})
        .await
        .unwrap();

    let err = socket
        .run(&CancellationToken::new(), Duration::ZERO, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfService));
    assert!(err.is_transient());
}
