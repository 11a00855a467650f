//! In-process mock gateway for integration tests.
//!
//! Every accepted WebSocket is handed to the test as a [`MockConnection`];
//! the test reads the client's frames and scripts the replies. Dropping a
//! `MockConnection` tears the socket down without a close frame.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway_client::{ClientConfig, ClientStatus, GatewayClient};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Handshake id reserved by the client.
pub const HANDSHAKE_ID: &str = "00000000-0000-0000-0000-000000000000";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockGateway
// ============================================================================

pub struct MockGateway {
    url: String,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind mock gateway");
        let port = listener.local_addr().expect("local addr").port();
        let (connections_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (frames_tx, frames) = mpsc::unbounded_channel();
                let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            message = read.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                        let _ = frames_tx.send(value);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            out = outbound_rx.recv() => match out {
                                Some(message) => {
                                    let closing = matches!(message, Message::Close(_));
                                    if write.send(message).await.is_err() || closing {
                                        break;
                                    }
                                }
                                None => break,
                            },
                        }
                    }
                });

                if connections_tx
                    .send(MockConnection { frames, outbound })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{port}"),
            connections,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Config with short timeouts pointing at this gateway.
    pub fn config(&self) -> gateway_client::ClientConfigBuilder {
        ClientConfig::builder()
            .url(self.url.clone())
            .token("test-token")
            .connect_timeout(Duration::from_secs(2))
            .handshake_timeout(Duration::from_secs(2))
            .request_timeout(Duration::from_secs(2))
            .reconnect_delay(Duration::from_millis(50))
    }

    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> MockConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("mock gateway stopped")
    }

    /// Asserts no client connects within `window`.
    pub async fn assert_no_connection(&mut self, window: Duration) {
        if let Ok(Some(_)) = timeout(window, self.connections.recv()).await {
            panic!("unexpected client connection");
        }
    }

    /// Accepts a connection and completes the handshake with `hello`.
    pub async fn accept_ready(&mut self, hello: Value) -> MockConnection {
        let mut connection = self.accept().await;
        let request = connection.recv().await;
        assert_eq!(request["method"], "connect");
        connection.respond_ok(HANDSHAKE_ID, hello);
        connection
    }
}

// ============================================================================
// MockConnection
// ============================================================================

pub struct MockConnection {
    frames: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockConnection {
    /// Next frame sent by the client.
    pub async fn recv(&mut self) -> Value {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client connection closed")
    }

    /// Asserts the client sends nothing within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(frame)) = timeout(window, self.frames.recv()).await {
            panic!("unexpected frame from client: {frame}");
        }
    }

    /// Waits until the client closes the socket.
    pub async fn wait_closed(&mut self) {
        loop {
            match timeout(WAIT, self.frames.recv()).await {
                Ok(None) => return,
                Ok(Some(_)) => {}
                Err(_) => panic!("client did not close the connection"),
            }
        }
    }

    pub fn send(&self, frame: Value) {
        let _ = self.outbound.send(Message::Text(frame.to_string().into()));
    }

    pub fn respond_ok(&self, id: &str, payload: Value) {
        self.send(json!({ "type": "res", "id": id, "ok": true, "payload": payload }));
    }

    pub fn respond_err(&self, id: &str, code: &str, message: &str) {
        self.send(json!({
            "type": "res",
            "id": id,
            "ok": false,
            "error": { "code": code, "message": message }
        }));
    }

    pub fn event(&self, name: &str, payload: Value) {
        self.send(json!({ "type": "event", "event": name, "payload": payload }));
    }

    /// Sends a close frame.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

/// Id of a request frame.
pub fn request_id(frame: &Value) -> String {
    frame["id"].as_str().expect("request id").to_string()
}

/// Waits until `status` satisfies `predicate`.
pub async fn wait_for_status(
    client: &GatewayClient,
    predicate: impl Fn(&ClientStatus) -> bool,
) -> ClientStatus {
    let mut rx = client.watch_status();
    let found = timeout(WAIT, async {
        loop {
            {
                let status = rx.borrow_and_update();
                if predicate(&status) {
                    return status.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("status channel closed");
            }
        }
    })
    .await;
    found.expect("timed out waiting for status")
}
