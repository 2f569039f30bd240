//! Integration test: boots an in-process HTTP push server, connects a real
//! [`StreamClient`] over [`HttpTransport`](pl_client::HttpTransport), and
//! asserts the request shape, event delivery, replay suppression and
//! recovery paths end to end.
//!
//! The server answers each accepted connection with the next scripted
//! reply: a bare status, or a chunked `text/event-stream` body fed by the
//! test.  Dropping the body sender ends the response.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pl_client::{
    ClientEvent, ConnectionState, Event, EventKind, HttpTransport, ReconnectBackoff,
    StreamClient, StreamClientBuilder, StreamRequest, Subscription, Transport,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

// ── Mini push server ────────────────────────────────────────────────────

enum Reply {
    Status(u16),
    Stream(mpsc::UnboundedReceiver<String>),
}

/// Request line and lower-cased headers of one accepted request.
#[derive(Debug, Clone)]
struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct PushServer {
    addr: SocketAddr,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: mpsc::UnboundedReceiver<CapturedRequest>,
}

impl PushServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let replies: Arc<Mutex<VecDeque<Reply>>> = Arc::default();
        let (req_tx, requests) = mpsc::unbounded_channel();

        let queue = replies.clone();
        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let reply = queue.lock().pop_front();
                let req_tx = req_tx.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, reply, req_tx).await;
                });
            }
        });

        Self {
            addr,
            replies,
            requests,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn refuse(&self, status: u16) {
        self.replies.lock().push_back(Reply::Status(status));
    }

    /// Queue a streaming reply; returns the handle that feeds its body.
    fn stream(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.replies.lock().push_back(Reply::Stream(rx));
        tx
    }

    async fn next_request(&mut self) -> CapturedRequest {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("server stopped")
    }
}

async fn serve(
    stream: TcpStream,
    reply: Option<Reply>,
    requests: mpsc::UnboundedSender<CapturedRequest>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
        }
    }
    let _ = requests.send(CapturedRequest {
        request_line: request_line.trim_end().to_owned(),
        headers,
    });

    match reply {
        Some(Reply::Stream(mut chunks)) => {
            write
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      content-type: text/event-stream\r\n\
                      cache-control: no-cache\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await?;
            write.flush().await?;
            while let Some(chunk) = chunks.recv().await {
                write
                    .write_all(format!("{:x}\r\n{chunk}\r\n", chunk.len()).as_bytes())
                    .await?;
                write.flush().await?;
            }
            write.write_all(b"0\r\n\r\n").await?;
        }
        Some(Reply::Status(code)) => {
            write
                .write_all(
                    format!(
                        "HTTP/1.1 {code} Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    )
                    .as_bytes(),
                )
                .await?;
        }
        None => {
            write
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await?;
        }
    }
    write.shutdown().await
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn client(server: &PushServer) -> StreamClient {
    client_with(server, Duration::from_secs(5))
}

fn client_with(server: &PushServer, heartbeat_timeout: Duration) -> StreamClient {
    StreamClientBuilder::new()
        .base_url(server.base_url())
        .token("tok-1")
        .client_id("desk-7")
        .heartbeat_timeout(heartbeat_timeout)
        .connect_timeout(Duration::from_secs(2))
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
        })
        .build()
        .unwrap()
}

async fn next_event(sub: &mut Subscription) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

async fn next_app_event(sub: &mut Subscription) -> Event {
    loop {
        if let ClientEvent::Event(event) = next_event(sub).await {
            return event;
        }
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<ConnectionState>,
    pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("client dropped")
        .clone()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_shape_and_event_delivery() {
    let mut server = PushServer::start().await;
    let body = server.stream();

    let client = client(&server);
    let mut sub = client.subscribe();
    client.connect();

    let request = server.next_request().await;
    assert_eq!(
        request.request_line,
        "GET /stream/tok-1?clientId=desk-7 HTTP/1.1"
    );
    assert_eq!(request.header("accept"), Some("text/event-stream"));
    assert_eq!(request.header("cache-control"), Some("no-cache"));
    assert_eq!(request.header("last-event-id"), None);

    assert_eq!(next_event(&mut sub).await, ClientEvent::Connected);

    body.send(": keep-alive comment\n\n".into()).unwrap();
    body.send("event: heartbeat\ndata: {}\n\n".into()).unwrap();
    // A frame split across two chunks, with CRLF line endings.
    body.send("event: order\r\nid: o-1\r\ndata: {\"sku\":".into())
        .unwrap();
    body.send("\"A7\",\"qty\":2}\r\n\r\n".into()).unwrap();
    body.send("data: plain\n\n".into()).unwrap();
    body.send("id: m-2\ndata: \"hello\"\n\n".into()).unwrap();

    let order = next_app_event(&mut sub).await;
    assert_eq!(order.id, "o-1");
    assert_eq!(order.kind, EventKind::Named("order".into()));
    assert_eq!(order.payload, serde_json::json!({"sku": "A7", "qty": 2}));

    // The undecodable frame was dropped; the stream kept going.
    let message = next_app_event(&mut sub).await;
    assert_eq!(message.id, "m-2");
    assert_eq!(message.kind, EventKind::Message);
    assert_eq!(message.payload, serde_json::json!("hello"));

    let state = client.connection_state();
    assert!(state.connected);
    assert!(state.last_liveness_at.is_some());
    assert_eq!(state.events_delivered, 2);
}

#[tokio::test]
async fn replay_after_server_close_is_suppressed() {
    let mut server = PushServer::start().await;
    let first = server.stream();
    let second = server.stream();

    let client = client(&server);
    let mut sub = client.subscribe();
    let mut state = client.watch_state();
    client.connect();

    first.send("id: 1\ndata: 1\n\nid: 2\ndata: 2\n\n".into()).unwrap();
    assert_eq!(next_app_event(&mut sub).await.id, "1");
    assert_eq!(next_app_event(&mut sub).await.id, "2");
    drop(first);

    // The server replays what it thinks the client missed.
    second.send("id: 2\ndata: 2\n\nid: 3\ndata: 3\n\n".into()).unwrap();
    assert_eq!(next_app_event(&mut sub).await.id, "3");

    let snapshot = wait_for(&mut state, |s| s.duplicates_suppressed == 1).await;
    assert_eq!(snapshot.events_delivered, 3);

    let _first_request = server.next_request().await;
    let resumed = server.next_request().await;
    assert_eq!(resumed.header("last-event-id"), Some("2"));
}

#[tokio::test]
async fn recovers_from_unavailable_server() {
    let mut server = PushServer::start().await;
    server.refuse(503);
    server.refuse(503);
    let body = server.stream();

    let client = client(&server);
    let mut sub = client.subscribe();
    client.connect();

    assert_eq!(next_event(&mut sub).await, ClientEvent::Connected);
    for _ in 0..3 {
        server.next_request().await;
    }

    let state = client.connection_state();
    assert!(state.connected);
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(state.last_error, None);

    body.send("id: 9\ndata: true\n\n".into()).unwrap();
    assert_eq!(next_app_event(&mut sub).await.payload, serde_json::json!(true));
}

#[tokio::test]
async fn heartbeat_silence_reconnects() {
    let server = PushServer::start().await;
    let _silent = server.stream();
    let second = server.stream();

    let client = client_with(&server, Duration::from_millis(300));
    let mut sub = client.subscribe();
    client.connect();

    assert_eq!(next_event(&mut sub).await, ClientEvent::Connected);
    match next_event(&mut sub).await {
        ClientEvent::Disconnected { reason } => {
            assert_eq!(reason, "no heartbeat within 300ms");
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert_eq!(next_event(&mut sub).await, ClientEvent::Connected);

    second.send("event: heartbeat\ndata: {}\n\n".into()).unwrap();
    second.send("id: after\ndata: {}\n\n".into()).unwrap();
    assert_eq!(next_app_event(&mut sub).await.id, "after");
}

#[tokio::test]
async fn unusable_last_event_id_is_left_out_of_the_request() {
    let mut server = PushServer::start().await;
    let _body = server.stream();

    let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
    let request = StreamRequest {
        url: format!("{}/stream/tok-1", server.base_url()).parse().unwrap(),
        last_event_id: Some("a\u{1}b".into()),
    };
    let opened = tokio::time::timeout(Duration::from_secs(5), transport.open(&request))
        .await
        .expect("timed out opening the stream");
    assert!(opened.is_ok(), "open failed: {:?}", opened.err());

    let seen = server.next_request().await;
    assert_eq!(seen.request_line, "GET /stream/tok-1 HTTP/1.1");
    assert_eq!(seen.header("accept"), Some("text/event-stream"));
    assert_eq!(seen.header("last-event-id"), None);
}

#[tokio::test]
async fn disconnect_closes_the_response() {
    let server = PushServer::start().await;
    let body = server.stream();

    let client = client(&server);
    let mut state = client.watch_state();
    client.connect();
    wait_for(&mut state, |s| s.connected).await;

    client.disconnect();
    assert!(!client.connection_state().connected);

    // The server notices the peer went away once it writes.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !body.is_closed() {
        assert!(tokio::time::Instant::now() < deadline, "response never closed");
        let _ = body.send("event: heartbeat\ndata: {}\n\n".into());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
