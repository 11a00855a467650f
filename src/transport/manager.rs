//! Connection manager and socket event loop.
//!
//! One manager owns one logical session with the gateway. It spawns a tokio
//! task that owns the WebSocket and drives the lifecycle:
//!
//! 1. `Connecting` - open the transport (bounded by `connect_timeout`)
//! 2. `Handshaking` - send `connect` under the reserved id, resend it on
//!    every `connect.challenge`, wait for the hello (bounded by
//!    `handshake_timeout`, never extended)
//! 3. `Ready` - write queued requests, resolve responses, fan out events
//! 4. `Closing` - reject every pending call, then sleep the reconnect delay
//!    and start over while the manager should stay connected
//!
//! # Locking
//!
//! The phase, the pending table and the stay-connected flag live behind one
//! mutex. `request()` checks the phase, registers the entry and queues the
//! frame under that lock, and the close path flips the phase and drains the
//! table under it, so a call is either drained by the close or refused with
//! `NotConnected`. Listeners always run with the lock released.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{CHALLENGE_EVENT, Frame, HelloPayload, RequestFrame, decode, encode};
use crate::status::StatusPublisher;

use super::fanout::EventFanout;
use super::pending::{PendingTable, Responder, reject_closed};
use super::state::Phase;

// ============================================================================
// Types
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketWriter = SplitSink<Socket, Message>;

/// Internal commands for the event loop.
enum ManagerCommand {
    /// Write an already registered request.
    Send { id: RequestId, message: Message },
    /// Close the connection and stop reconnecting.
    Shutdown,
}

/// How one connection attempt ended.
enum SessionEnd {
    /// `disconnect()` was called or the manager was dropped.
    Shutdown,
    /// The transport closed, with the failure that caused it if any.
    Closed(Option<Error>),
}

/// What the event loop must do after dispatching a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Continue,
    ResendHandshake,
}

/// State guarded by the manager mutex.
struct ManagerInner {
    phase: Phase,
    pending: PendingTable,
    stay_connected: bool,
    reconnect_attempts: u32,
}

// ============================================================================
// ManagerShared
// ============================================================================

/// State shared between the manager handle and its event loop.
struct ManagerShared {
    inner: Mutex<ManagerInner>,
    config: ClientConfig,
    fanout: Arc<EventFanout>,
    status: StatusPublisher,
}

impl ManagerShared {
    fn new(config: ClientConfig, fanout: Arc<EventFanout>, status: StatusPublisher) -> Self {
        let pending = PendingTable::new(config.max_pending_requests);
        Self {
            inner: Mutex::new(ManagerInner {
                phase: Phase::Idle,
                pending,
                stay_connected: true,
                reconnect_attempts: 0,
            }),
            config,
            fanout,
            status,
        }
    }

    /// `Idle → Connecting`, unless shut down.
    fn begin_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.stay_connected || !inner.phase.advance(Phase::Connecting) {
            return false;
        }

        let attempts = inner.reconnect_attempts;
        self.status.publish(|status| {
            status.phase = Phase::Connecting;
            status.connected = false;
            status.connecting = true;
            status.reconnect_attempts = attempts;
        });
        true
    }

    /// `Connecting → Handshaking`, registering the handshake entry.
    fn begin_handshake(&self, responder: Responder) -> bool {
        let mut inner = self.inner.lock();
        if !inner.stay_connected || !inner.phase.advance(Phase::Handshaking) {
            return false;
        }

        if let Err(e) = inner.pending.insert_handshake(responder) {
            warn!(error = %e, "Handshake entry already present");
        }
        self.status.publish(|status| status.phase = Phase::Handshaking);
        true
    }

    /// Applies the handshake outcome; `Handshaking → Ready` on success.
    ///
    /// `None` means the handshake entry was dropped without a response.
    fn complete_handshake(&self, outcome: Option<Result<Value>>) -> Result<()> {
        let payload = match outcome {
            Some(Ok(payload)) => payload,
            Some(Err(Error::Server { code, message, .. })) => {
                return Err(Error::handshake_failed(format!("{code}: {message}")));
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::ConnectionClosed),
        };

        let hello = HelloPayload::from_value(payload);
        hello.validate(&self.config.connect_params())?;

        let mut inner = self.inner.lock();
        if !inner.stay_connected {
            return Err(Error::ConnectionClosed);
        }
        if !inner.phase.advance(Phase::Ready) {
            return Err(Error::protocol(format!(
                "handshake completed in phase {}",
                inner.phase
            )));
        }

        inner.reconnect_attempts = 0;
        info!(protocol = ?hello.protocol, "Gateway handshake completed");
        self.status.publish(|status| {
            status.phase = Phase::Ready;
            status.connected = true;
            status.connecting = false;
            status.last_error = None;
            status.hello = Some(hello);
            status.reconnect_attempts = 0;
        });
        Ok(())
    }

    /// Drops the handshake entry after its deadline passed.
    fn abandon_handshake(&self) {
        self.inner.lock().pending.remove(&RequestId::handshake());
    }

    /// Routes one inbound message.
    fn dispatch(&self, message: &Message) -> Dispatch {
        let frame = match decode(message) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Dispatch::Continue,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return Dispatch::Continue;
            }
        };

        match frame {
            Frame::Response(response) => {
                let id = response.id;
                if !self.inner.lock().pending.resolve(response) {
                    debug!(request_id = %id, "Dropping response for unknown request");
                }
                Dispatch::Continue
            }

            Frame::Event(event) if event.event == CHALLENGE_EVENT => {
                let inner = self.inner.lock();
                if inner.phase == Phase::Handshaking
                    && inner.pending.contains(&RequestId::handshake())
                {
                    Dispatch::ResendHandshake
                } else {
                    debug!(phase = %inner.phase, "Ignoring challenge outside handshake");
                    Dispatch::Continue
                }
            }

            Frame::Event(event) => {
                trace!(event = %event.event, seq = ?event.seq, "Fanning out event");
                self.fanout.emit(&event);
                Dispatch::Continue
            }

            Frame::Request(request) => {
                warn!(method = %request.method, "Ignoring request frame from gateway");
                Dispatch::Continue
            }
        }
    }

    /// Fails one request whose frame could not be written.
    fn fail_request(&self, id: &RequestId, error: Error) {
        self.inner.lock().pending.fail(id, error);
    }

    /// Closes out a session: drain the table and return to `Idle`.
    fn finish_session(&self, error: Option<Error>) {
        let error = error.map(Arc::new);
        let drained = {
            let mut inner = self.inner.lock();
            if !matches!(inner.phase, Phase::Connecting | Phase::Closing) {
                inner.phase.advance(Phase::Closing);
            }
            let drained = inner.pending.drain();
            inner.phase.advance(Phase::Idle);

            if inner.stay_connected && self.config.auto_reconnect {
                inner.reconnect_attempts = inner.reconnect_attempts.saturating_add(1);
            }
            let attempts = inner.reconnect_attempts;

            match &error {
                Some(e) => warn!(error = %e, rejected = drained.len(), "Gateway connection closed"),
                None => info!(rejected = drained.len(), "Gateway connection closed"),
            }

            // Failures after shutdown are side effects of the close itself.
            let report = error.is_some() && inner.stay_connected;
            self.status.publish(|status| {
                status.phase = Phase::Idle;
                status.connected = false;
                status.connecting = false;
                status.reconnect_attempts = attempts;
                if report {
                    status.last_error = error;
                }
            });
            drained
        };

        reject_closed(drained);
    }

    fn should_reconnect(&self) -> bool {
        self.inner.lock().stay_connected && self.config.auto_reconnect
    }
}

// ============================================================================
// PendingEntryGuard
// ============================================================================

/// Ties a table entry to the lifetime of the call waiting on it.
struct PendingEntryGuard<'a> {
    shared: &'a ManagerShared,
    id: RequestId,
}

impl Drop for PendingEntryGuard<'_> {
    fn drop(&mut self) {
        if self.shared.inner.lock().pending.remove(&self.id).is_some() {
            debug!(request_id = %self.id, "Request abandoned by caller");
        }
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Handle to one gateway connection and its reconnect loop.
///
/// Created by [`GatewayClient::connect`](crate::GatewayClient::connect);
/// shut down when replaced, on `disconnect()`, or on drop.
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
    command_tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl ConnectionManager {
    /// Spawns the event loop. Must be called inside a tokio runtime.
    pub(crate) fn start(
        config: ClientConfig,
        fanout: Arc<EventFanout>,
        status: StatusPublisher,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ManagerShared::new(config, fanout, status));

        tokio::spawn(Self::run_loop(Arc::clone(&shared), command_rx));

        Self { shared, command_tx }
    }

    /// Returns the configuration this manager connects with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns the current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().phase
    }

    /// Returns the number of outstanding requests, handshake included.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not ready
    /// - [`Error::TooManyPendingRequests`] if the pending table is full
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::ConnectionClosed`] if the connection drops first
    /// - [`Error::Connection`] if the frame could not be written
    /// - [`Error::Server`] if the gateway answered with an error
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        let frame = RequestFrame::new(method, params);
        let request_id = frame.id;
        let message = encode(&Frame::Request(frame))?;

        let (response_tx, mut response_rx) = oneshot::channel();
        {
            let mut inner = self.shared.inner.lock();
            if !inner.phase.is_ready() {
                return Err(Error::NotConnected);
            }

            inner.pending.insert(request_id, method, response_tx)?;

            let queued = self.command_tx.send(ManagerCommand::Send {
                id: request_id,
                message,
            });
            if queued.is_err() {
                inner.pending.remove(&request_id);
                return Err(Error::ConnectionClosed);
            }
        }
        trace!(%request_id, %method, "Request queued");

        // Removes the entry if the caller stops waiting before it settles.
        let _entry = PendingEntryGuard {
            shared: &self.shared,
            id: request_id,
        };

        match timeout(request_timeout, &mut response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let removed = self.shared.inner.lock().pending.remove(&request_id);
                if removed.is_none() {
                    // Settled between the deadline and the removal.
                    return response_rx.try_recv().unwrap_or(Err(Error::ConnectionClosed));
                }

                debug!(%request_id, %method, "Request timed out");
                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Stops the manager.
    ///
    /// Rejects every pending call, refuses new ones, closes the socket and
    /// cancels any scheduled reconnect. No connection attempt starts after
    /// this returns.
    pub fn shutdown(&self) {
        let drained = {
            let mut inner = self.shared.inner.lock();
            inner.stay_connected = false;
            if !matches!(inner.phase, Phase::Idle | Phase::Closing) {
                inner.phase.advance(Phase::Closing);
            }

            let phase = inner.phase;
            self.shared.status.publish(|status| {
                status.phase = phase;
                status.connected = false;
                status.connecting = false;
            });
            inner.pending.drain()
        };

        reject_closed(drained);
        let _ = self.command_tx.send(ManagerCommand::Shutdown);
        debug!("Connection manager shutdown requested");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Event Loop
// ============================================================================

impl ConnectionManager {
    /// Connect, run, close, wait, repeat.
    async fn run_loop(
        shared: Arc<ManagerShared>,
        mut command_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    ) {
        while shared.begin_attempt() {
            let end = Self::run_session(&shared, &mut command_rx).await;

            let (shutdown, error) = match end {
                SessionEnd::Shutdown => (true, None),
                SessionEnd::Closed(error) => (false, error),
            };
            shared.finish_session(error);

            if shutdown || Self::discard_stale_commands(&mut command_rx) {
                break;
            }
            if !shared.should_reconnect() {
                break;
            }

            info!(
                delay_ms = shared.config.reconnect_delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            if !Self::wait_reconnect_delay(&shared, &mut command_rx).await {
                break;
            }
        }

        debug!("Connection manager terminated");
    }

    /// Runs one connection attempt to completion.
    async fn run_session(
        shared: &ManagerShared,
        command_rx: &mut mpsc::UnboundedReceiver<ManagerCommand>,
    ) -> SessionEnd {
        let socket = match Self::open(shared, command_rx).await {
            Ok(socket) => socket,
            Err(end) => return end,
        };
        let (mut writer, mut reader) = socket.split();

        let handshake = match shared
            .config
            .connect_params()
            .to_request()
            .and_then(|request| encode(&Frame::Request(request)))
        {
            Ok(message) => message,
            Err(e) => {
                let _ = writer.close().await;
                return SessionEnd::Closed(Some(e));
            }
        };

        let (handshake_tx, mut handshake_rx) = oneshot::channel();
        if !shared.begin_handshake(handshake_tx) {
            let _ = writer.close().await;
            return SessionEnd::Shutdown;
        }
        if let Err(e) = writer.send(handshake.clone()).await {
            return SessionEnd::Closed(Some(Error::connection(format!(
                "handshake send failed: {e}"
            ))));
        }
        debug!("Handshake request sent");

        let handshake_timeout = shared.config.handshake_timeout;
        let deadline = sleep(handshake_timeout);
        tokio::pin!(deadline);
        let mut handshaking = true;

        loop {
            tokio::select! {
                message = reader.next() => match message {
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by gateway");
                        return SessionEnd::Closed(None);
                    }

                    Some(Ok(message)) => {
                        if shared.dispatch(&message) == Dispatch::ResendHandshake {
                            debug!("Handshake challenge received, resending connect");
                            if let Err(e) = writer.send(handshake.clone()).await {
                                return SessionEnd::Closed(Some(Error::WebSocket(e)));
                            }
                        }
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        return SessionEnd::Closed(Some(Error::WebSocket(e)));
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        return SessionEnd::Closed(None);
                    }
                },

                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Send { id, message }) => {
                        if let Err(e) = writer.send(message).await {
                            let reason = format!("send failed: {e}");
                            shared.fail_request(&id, Error::connection(reason.clone()));
                            return SessionEnd::Closed(Some(Error::connection(reason)));
                        }
                        trace!(request_id = %id, "Request sent");
                    }

                    Some(ManagerCommand::Shutdown) | None => {
                        let _ = writer.close().await;
                        return SessionEnd::Shutdown;
                    }
                },

                outcome = &mut handshake_rx, if handshaking => {
                    handshaking = false;
                    if let Err(e) = shared.complete_handshake(outcome.ok()) {
                        return Self::abort_handshake(&mut writer, e).await;
                    }
                }

                () = &mut deadline, if handshaking => {
                    handshaking = false;
                    // The hello may have landed in the same tick as the deadline.
                    let outcome = match handshake_rx.try_recv() {
                        Ok(result) => shared.complete_handshake(Some(result)),
                        Err(_) => {
                            shared.abandon_handshake();
                            Err(Error::handshake_timeout(handshake_timeout.as_millis() as u64))
                        }
                    };
                    if let Err(e) = outcome {
                        return Self::abort_handshake(&mut writer, e).await;
                    }
                }
            }
        }
    }

    /// Opens the transport, giving up on shutdown or timeout.
    async fn open(
        shared: &ManagerShared,
        command_rx: &mut mpsc::UnboundedReceiver<ManagerCommand>,
    ) -> std::result::Result<Socket, SessionEnd> {
        let url = shared.config.url.as_str();
        let connect_timeout = shared.config.connect_timeout;
        info!(%url, "Connecting to gateway");

        let connect = timeout(connect_timeout, connect_async(url));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(Ok((socket, _response))) => {
                            debug!(%url, "WebSocket connection established");
                            Ok(socket)
                        }
                        Ok(Err(e)) => Err(SessionEnd::Closed(Some(Error::connection(format!(
                            "failed to open {url}: {e}"
                        ))))),
                        Err(_) => Err(SessionEnd::Closed(Some(Error::connection(format!(
                            "timed out opening {url} after {}ms",
                            connect_timeout.as_millis()
                        ))))),
                    };
                }

                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Send { id, .. }) => {
                        trace!(request_id = %id, "Discarding send queued before connect");
                    }
                    Some(ManagerCommand::Shutdown) | None => return Err(SessionEnd::Shutdown),
                },
            }
        }
    }

    /// A failed handshake is a failed connection attempt: close the socket.
    async fn abort_handshake(writer: &mut SocketWriter, error: Error) -> SessionEnd {
        warn!(error = %error, "Handshake failed, closing connection");
        let _ = writer.close().await;
        SessionEnd::Closed(Some(error))
    }

    /// Drops sends queued for a connection that no longer exists.
    ///
    /// Returns `true` if a shutdown was found among them.
    fn discard_stale_commands(command_rx: &mut mpsc::UnboundedReceiver<ManagerCommand>) -> bool {
        loop {
            match command_rx.try_recv() {
                Ok(ManagerCommand::Send { id, .. }) => {
                    trace!(request_id = %id, "Discarding send for closed connection");
                }
                Ok(ManagerCommand::Shutdown) => return true,
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Sleeps the reconnect delay. Returns `false` if shut down meanwhile.
    async fn wait_reconnect_delay(
        shared: &ManagerShared,
        command_rx: &mut mpsc::UnboundedReceiver<ManagerCommand>,
    ) -> bool {
        let delay = sleep(shared.config.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = &mut delay => return true,
                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Send { id, .. }) => {
                        trace!(request_id = %id, "Discarding send for closed connection");
                    }
                    Some(ManagerCommand::Shutdown) | None => return false,
                },
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
