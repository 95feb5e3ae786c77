use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use dm_client::{DmError, HttpRelay, RelayApi, ServerConfig};
use dm_proto::{
    api::{GetKeyRequest, HistoryRequest, RegisterKeyRequest, SendRequest},
    b64, PublicIdentity,
};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// Local relay answering each path with a canned status and body. Unknown
/// paths get 404. Every request is recorded.
async fn serve(routes: Vec<(&'static str, u16, String)>) -> (HttpRelay, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::default();
    let routes: HashMap<&'static str, (u16, String)> =
        routes.into_iter().map(|(path, status, body)| (path, (status, body))).collect();

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let Some(request) = read_request(&mut stream).await else {
                continue;
            };
            let (status, body) = routes
                .get(request.path.as_str())
                .cloned()
                .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));
            server_log.lock().push(request);

            let reason = StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown");
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    let server = ServerConfig::from_base_url(&format!("http://{addr}")).unwrap();
    (HttpRelay::new(&server).unwrap(), log)
}

async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_len = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_len]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < head_len + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(head_len + content_length);

    Some(Recorded {
        method,
        path,
        headers,
        body: buf[head_len..end].to_vec(),
    })
}

fn bob() -> PublicIdentity {
    PublicIdentity::new(1, vec![2; 32])
}

fn history_request() -> HistoryRequest {
    HistoryRequest {
        other_party: bob(),
        cursor: Some("c1".into()),
        limit: Some(50),
    }
}

#[tokio::test]
async fn send_posts_signed_body_with_bearer() {
    let (relay, log) = serve(vec![(
        "/send",
        200,
        json!({"success": true, "message_id": "m1", "timestamp": "2024-01-01T00:00:00Z"}).to_string(),
    )])
    .await;

    let req = SendRequest {
        message_id: "m1".into(),
        recipient: bob(),
        ephemeral_public_key: vec![3; 32],
        encrypted_content: vec![4; 48],
        nonce: vec![5; 12],
        encryption_algorithm: "ChaCha20Poly1305".into(),
        signature: vec![6; 64],
        reply_to: Some("m0".into()),
    };
    let resp = relay.send("Bearer abc", &req).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.message_id.as_deref(), Some("m1"));

    let seen = log.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/send");
    assert_eq!(seen[0].headers.get("authorization").map(String::as_str), Some("Bearer abc"));

    let body = seen[0].json();
    assert_eq!(body["signature"], b64::encode(&[6; 64]));
    assert!(body.get("message_signature").is_none());
    assert_eq!(body["ephemeral_public_key"], b64::encode(&[3; 32]));
    assert_eq!(body["nonce"], b64::encode(&[5; 12]));
    assert_eq!(body["encryption_algorithm"], "ChaCha20Poly1305");
    assert_eq!(body["reply_to"], "m0");
    assert_eq!(body["recipient"], serde_json::to_value(bob()).unwrap());
}

#[tokio::test]
async fn get_key_is_unauthenticated_and_404_means_not_found() {
    let (relay, log) = serve(vec![]).await;
    let resp = relay.get_key(&GetKeyRequest { identity: bob() }).await.unwrap();
    assert!(!resp.found);
    assert!(resp.x25519_public_key.is_none());

    let seen = log.lock().clone();
    assert_eq!(seen[0].path, "/get_key");
    assert!(!seen[0].headers.contains_key("authorization"));
    assert_eq!(seen[0].json()["identity"], serde_json::to_value(bob()).unwrap());
}

#[tokio::test]
async fn get_key_returns_registered_key() {
    let (relay, _log) = serve(vec![(
        "/get_key",
        200,
        json!({"found": true, "x25519_public_key": b64::encode(&[7; 32])}).to_string(),
    )])
    .await;
    let resp = relay.get_key(&GetKeyRequest { identity: bob() }).await.unwrap();
    assert!(resp.found);
    assert_eq!(resp.x25519_public_key, Some(vec![7; 32]));
}

#[tokio::test]
async fn register_conflict_counts_as_success() {
    let (relay, log) = serve(vec![("/register_key", 409, r#"{"error":"exists"}"#.into())]).await;
    let req = RegisterKeyRequest {
        x25519_public_key: vec![8; 32],
        signature: vec![9; 64],
    };
    let resp = relay.register_key("Bearer reg", &req).await.unwrap();
    assert!(resp.success);

    let seen = log.lock().clone();
    assert_eq!(seen[0].headers.get("authorization").map(String::as_str), Some("Bearer reg"));
    assert_eq!(seen[0].json()["x25519_public_key"], b64::encode(&[8; 32]));
    assert_eq!(seen[0].json()["signature"], b64::encode(&[9; 64]));
}

#[tokio::test]
async fn status_codes_map_onto_error_kinds() {
    let cases: [(u16, fn(&DmError) -> bool); 6] = [
        (401, |e| matches!(e, DmError::Authentication(_))),
        (403, |e| matches!(e, DmError::Authentication(_))),
        (429, |e| matches!(e, DmError::Network(_))),
        (500, |e| matches!(e, DmError::Network(_))),
        (503, |e| matches!(e, DmError::Network(_))),
        (400, |e| matches!(e, DmError::Rejected(_))),
    ];
    for (status, expected) in cases {
        let (relay, _log) = serve(vec![("/history", status, r#"{"error":"nope"}"#.into())]).await;
        let err = relay.history("Bearer h", &history_request()).await.unwrap_err();
        assert!(expected(&err), "{status} mapped to {err:?}");
        assert_eq!(err.is_retryable(), status == 429 || status >= 500);
    }
}

#[tokio::test]
async fn rejection_carries_relay_reason() {
    let (relay, _log) = serve(vec![("/send", 422, r#"{"error":"bad message signature"}"#.into())]).await;
    let req = SendRequest {
        message_id: "m1".into(),
        recipient: bob(),
        ephemeral_public_key: vec![3; 32],
        encrypted_content: vec![4; 48],
        nonce: vec![5; 12],
        encryption_algorithm: "AES256GCM".into(),
        signature: vec![6; 64],
        reply_to: None,
    };
    match relay.send("Bearer abc", &req).await {
        Err(DmError::Rejected(reason)) => assert!(reason.contains("bad message signature")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn challenge_failures_are_authentication_errors() {
    let (relay, _log) = serve(vec![("/challenge", 500, "{}".into())]).await;
    assert!(matches!(relay.challenge().await, Err(DmError::Authentication(_))));

    let (relay, _log) = serve(vec![("/challenge", 200, "not json".into())]).await;
    assert!(matches!(relay.challenge().await, Err(DmError::Authentication(_))));

    let body = json!({"challenge": b64::encode(b"nonce"), "created_on": 1u64}).to_string();
    let valid = json!({"body": b64::encode(body.as_bytes()), "hmac": b64::encode(&[1; 32])});
    let (relay, log) = serve(vec![("/challenge", 200, valid.to_string())]).await;
    let challenge = relay.challenge().await.unwrap();
    assert_eq!(challenge.nonce().unwrap(), b"nonce");
    assert_eq!(log.lock()[0].method, "GET");
}

#[tokio::test]
async fn history_and_conversations_paths() {
    let (relay, log) = serve(vec![
        ("/history", 200, json!({"messages": [], "next_cursor": null}).to_string()),
        (
            "/conversations/detailed",
            200,
            json!({"conversations": [{"other_party": serde_json::to_value(bob()).unwrap(), "unread_count": 3}]})
                .to_string(),
        ),
    ])
    .await;

    let page = relay.history("Bearer h", &history_request()).await.unwrap();
    assert!(page.messages.is_empty());
    assert!(page.next_cursor.is_none());

    let convs = relay.conversations("Bearer c").await.unwrap();
    assert_eq!(convs.conversations.len(), 1);
    assert_eq!(convs.conversations[0].unread_count, 3);

    let seen = log.lock().clone();
    assert_eq!(seen[0].path, "/history");
    assert_eq!(seen[0].json()["cursor"], "c1");
    assert_eq!(seen[0].json()["limit"], 50);
    assert_eq!(seen[1].method, "GET");
    assert_eq!(seen[1].path, "/conversations/detailed");
    assert_eq!(seen[1].headers.get("authorization").map(String::as_str), Some("Bearer c"));
}

#[tokio::test]
async fn health_reflects_status() {
    let (relay, _log) = serve(vec![("/health", 200, "{}".into())]).await;
    assert!(relay.health().await.unwrap());

    let (relay, _log) = serve(vec![("/health", 503, "{}".into())]).await;
    assert!(!relay.health().await.unwrap());
}
