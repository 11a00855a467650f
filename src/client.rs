//! Public client facade.
//!
//! [`GatewayClient`] is the only entry point UI code needs: connect,
//! disconnect, call methods, subscribe to events and observe the connection
//! state. It owns at most one [`ConnectionManager`] and replaces it wholesale
//! on every `connect()`.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{ClientConfig, GatewayClient};
//! use serde_json::json;
//!
//! # async fn example() -> gateway_client::Result<()> {
//! let client = GatewayClient::new();
//! client.connect(ClientConfig::builder().url("ws://127.0.0.1:18789").token("t").build()?);
//!
//! let chat = client.subscribe_event("chat", |event| {
//!     println!("chat: {}", event.payload);
//! });
//!
//! client.wait_until_ready(std::time::Duration::from_secs(5)).await?;
//! let sessions = client.call("sessions.list", json!({ "limit": 50 })).await?;
//! println!("{sessions}");
//!
//! chat.unsubscribe();
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{Credential, EventFrame, HelloPayload};
use crate::status::{ClientStatus, StatusPublisher};
use crate::transport::{ConnectionManager, EventFanout, Phase, Subscription};

// ============================================================================
// ClientInner
// ============================================================================

/// Shared state behind every clone of a [`GatewayClient`].
struct ClientInner {
    /// Active manager, if any.
    manager: Mutex<Option<Arc<ConnectionManager>>>,
    /// Listeners survive reconnects and reconfiguration.
    fanout: Arc<EventFanout>,
    /// Observable status.
    status_tx: Arc<watch::Sender<ClientStatus>>,
    /// Epoch of the active manager; retired managers cannot publish.
    epoch: Arc<AtomicU64>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.get_mut().take() {
            manager.shutdown();
        }
    }
}

// ============================================================================
// GatewayClient
// ============================================================================

/// Persistent connection client for the gateway.
///
/// Cheap to clone; all clones share one connection. Dropping the last clone
/// disconnects.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("GatewayClient")
            .field("phase", &status.phase)
            .field("connected", &status.connected)
            .field("listeners", &self.inner.fanout.len())
            .finish_non_exhaustive()
    }
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// GatewayClient - Lifecycle
// ============================================================================

impl GatewayClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ClientStatus::default());
        Self {
            inner: Arc::new(ClientInner {
                manager: Mutex::new(None),
                fanout: Arc::new(EventFanout::new()),
                status_tx: Arc::new(status_tx),
                epoch: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Connects with `config`, replacing any existing connection.
    ///
    /// Returns immediately; the connection proceeds in the background and
    /// keeps reconnecting until [`disconnect`](Self::disconnect). Must be
    /// called inside a tokio runtime.
    pub fn connect(&self, config: ClientConfig) {
        let mut slot = self.inner.manager.lock();
        if let Some(previous) = slot.take() {
            debug!("Replacing existing gateway connection");
            previous.shutdown();
        }

        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner
            .status_tx
            .send_modify(|status| *status = ClientStatus::default());

        info!(url = %config.url, epoch, "Starting gateway connection");
        let publisher = StatusPublisher::new(
            Arc::clone(&self.inner.status_tx),
            epoch,
            Arc::clone(&self.inner.epoch),
        );
        *slot = Some(Arc::new(ConnectionManager::start(
            config,
            Arc::clone(&self.inner.fanout),
            publisher,
        )));
    }

    /// Connects to `url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] if `url` is invalid.
    pub fn connect_to(&self, url: &str, credential: Option<Credential>) -> Result<()> {
        let config = ClientConfig::for_endpoint(url, credential)?;
        self.connect(config);
        Ok(())
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Every pending call rejects with [`Error::ConnectionClosed`]; later
    /// calls fail with [`Error::NotConnected`].
    pub fn disconnect(&self) {
        let previous = self.inner.manager.lock().take();
        if let Some(manager) = previous {
            info!("Disconnecting from gateway");
            manager.shutdown();
        }
    }

    /// Waits until the handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the client is not ready within
    /// `wait`.
    pub async fn wait_until_ready(&self, wait: Duration) -> Result<HelloPayload> {
        let mut status_rx = self.watch_status();

        let ready = async {
            loop {
                {
                    let status = status_rx.borrow_and_update();
                    if status.connected
                        && let Some(hello) = &status.hello
                    {
                        return Ok(hello.clone());
                    }
                }
                if status_rx.changed().await.is_err() {
                    return Err(Error::ConnectionClosed);
                }
            }
        };

        timeout(wait, ready).await.map_err(|_| {
            Error::connection(format!(
                "gateway not ready after {}ms",
                wait.as_millis()
            ))
        })?
    }
}

// ============================================================================
// GatewayClient - Calls
// ============================================================================

impl GatewayClient {
    /// Calls `method` with the configured request timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if there is no ready connection
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::ConnectionClosed`] if the connection drops first
    /// - [`Error::Server`] if the gateway returns an error
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let manager = self.manager()?;
        let request_timeout = manager.config().request_timeout;
        manager.request(method, params, request_timeout).await
    }

    /// Calls `method` with a specific timeout.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        let manager = self.manager()?;
        manager.request(method, params, request_timeout).await
    }

    /// Calls `method` and decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), plus [`Error::Json`] if the payload
    /// does not match `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = self.call(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    fn manager(&self) -> Result<Arc<ConnectionManager>> {
        self.inner.manager.lock().clone().ok_or(Error::NotConnected)
    }
}

// ============================================================================
// GatewayClient - Events
// ============================================================================

impl GatewayClient {
    /// Registers a listener for every event.
    ///
    /// Listeners run on the connection task in registration order and
    /// should return quickly. A panicking listener is logged and skipped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        let id = self.inner.fanout.add(Arc::new(listener));
        Subscription::new(id, &self.inner.fanout)
    }

    /// Registers a listener for events named `event`.
    pub fn subscribe_event<F>(&self, event: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        let name = event.into();
        self.subscribe(move |frame| {
            if frame.event == name {
                listener(frame);
            }
        })
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.fanout.len()
    }
}

// ============================================================================
// GatewayClient - Status
// ============================================================================

impl GatewayClient {
    /// Returns a snapshot of the connection status.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Returns a receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Returns the current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.status_tx.borrow().phase
    }

    /// Returns `true` once the handshake has completed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status_tx.borrow().connected
    }

    /// Returns `true` while opening the transport or handshaking.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.inner.status_tx.borrow().connecting
    }

    /// Returns the most recent connection or handshake error.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.status_tx.borrow().last_error.clone()
    }

    /// Returns the most recent hello payload.
    #[must_use]
    pub fn hello(&self) -> Option<HelloPayload> {
        self.inner.status_tx.borrow().hello.clone()
    }

    /// Returns the number of outstanding calls, handshake included.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .manager
            .lock()
            .as_ref()
            .map_or(0, |manager| manager.pending_count())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_call_without_connect_is_not_connected() {
        let client = GatewayClient::new();
        let err = client.call("sessions.list", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_new_client_is_idle() {
        let client = GatewayClient::new();
        let status = client.status();
        assert_eq!(status.phase, Phase::Idle);
        assert!(!client.is_connected());
        assert!(!client.is_connecting());
        assert!(client.last_error().is_none());
        assert!(client.hello().is_none());
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let client = GatewayClient::new();
        let first = client.subscribe(|_| {});
        let second = client.subscribe_event("chat", |_| {});
        assert_eq!(client.listener_count(), 2);

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(client.listener_count(), 1);

        second.unsubscribe();
        assert_eq!(client.listener_count(), 0);
    }

    #[test]
    fn test_connect_to_rejects_bad_url() {
        let client = GatewayClient::new();
        let err = client.connect_to("http://localhost", None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let client = GatewayClient::new();
        client.disconnect();
        assert_eq!(client.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out() {
        let client = GatewayClient::new();
        let err = client
            .wait_until_ready(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }
}
