//! Connection driver.
//!
//! A connection owns two tasks. The read task is the only owner of the
//! [`FrameDecoder`]: it feeds it bytes from the transport, answers server
//! `echo` requests, and completes pending calls. Notifications and monitor
//! replies are handed to the worker task over a bounded queue; the worker
//! decodes values and mutates the table cache, so both kinds of work are
//! applied in wire order.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::fault::{Fault, FaultSink};
use crate::state::{ConnectionState, ConnectionStateMachine};
use bytes::Bytes;
use ovsdb_core::{DatabaseStore, NotificationRouter, RoutedUpdate};
use ovsdb_protocol::{
    Encoder, FrameDecoder, Message, Notification, Request, Response, ValueCodec, MONITOR_METHOD,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tracing::{debug, warn};

/// Event published to [`ConnectionHandle::subscribe`] receivers.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// An update notification was applied to the cache.
    Update(Arc<RoutedUpdate>),
    /// The connection closed. Carries the fault, or `None` for a local close.
    Closed(Option<Fault>),
}

type Reply = oneshot::Sender<Result<Response, ClientError>>;

struct PendingCall {
    reply: Reply,
    /// Set for `monitor` calls; the reply is installed into the cache.
    monitor_id: Option<Value>,
}

enum Work {
    Notification(Notification),
    MonitorReply {
        monitor_id: Value,
        response: Response,
        reply: Reply,
    },
}

/// Shared state of one connection.
pub struct Connection {
    config: ClientConfig,
    state: Mutex<ConnectionStateMachine>,
    state_tx: watch::Sender<ConnectionState>,
    pending: Mutex<HashMap<String, PendingCall>>,
    events: broadcast::Sender<ConnectionEvent>,
    sink: mpsc::Sender<Bytes>,
    router: NotificationRouter,
    fault_sink: Arc<dyn FaultSink>,
    shutdown: Notify,
    queue_stalls: AtomicU64,
}

impl Connection {
    /// Starts driving a connection over an established transport.
    ///
    /// `source` delivers bytes read from the transport, `sink` takes bytes to
    /// write to it. Must be called from within a tokio runtime.
    pub fn spawn(
        config: ClientConfig,
        source: mpsc::Receiver<Bytes>,
        sink: mpsc::Sender<Bytes>,
        fault_sink: Arc<dyn FaultSink>,
    ) -> Result<ConnectionHandle, ClientError> {
        config.validate()?;

        let router = NotificationRouter::new(
            Arc::new(DatabaseStore::new()),
            ValueCodec::new(config.codec),
            config.field_policy,
        )
        .with_default_db(config.default_database.clone());
        let (events, _) = broadcast::channel(config.event_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (work_tx, work_rx) = mpsc::channel(config.worker_queue);

        let conn = Arc::new(Connection {
            config,
            state: Mutex::new(ConnectionStateMachine::new()),
            state_tx,
            pending: Mutex::new(HashMap::new()),
            events,
            sink,
            router,
            fault_sink,
            shutdown: Notify::new(),
            queue_stalls: AtomicU64::new(0),
        });

        conn.transition(ConnectionState::Connected);
        tokio::spawn(read_loop(Arc::clone(&conn), source, work_tx));
        tokio::spawn(work_loop(Arc::clone(&conn), work_rx));

        Ok(ConnectionHandle { conn })
    }

    fn is_closed(&self) -> bool {
        self.state.lock().is_closed()
    }

    /// Applies a state transition and publishes it. Returns false if the
    /// transition was rejected.
    fn transition(&self, to: ConnectionState) -> bool {
        let mut state = self.state.lock();
        let from = match state.transition(to) {
            Ok(from) => from,
            Err(_) => return false,
        };
        if from != to {
            self.state_tx.send_replace(to);
            let _ = self.events.send(ConnectionEvent::StateChanged { from, to });
        }
        true
    }

    /// Moves to CLOSED, reports the fault and fails all pending calls.
    fn close(&self, fault: Option<Fault>) {
        if self.is_closed() || !self.transition(ConnectionState::Closed) {
            return;
        }

        if let Some(fault) = &fault {
            self.fault_sink.report(fault);
        }

        let pending: Vec<PendingCall> = self.pending.lock().drain().map(|(_, call)| call).collect();
        if !pending.is_empty() {
            debug!("failing {} pending calls", pending.len());
        }
        for call in pending {
            let _ = call.reply.send(Err(ClientError::ConnectionClosed));
        }

        let _ = self.events.send(ConnectionEvent::Closed(fault));
        self.shutdown.notify_waiters();
        self.shutdown.notify_one();
    }

    async fn dispatch(&self, doc: Value, work_tx: &mpsc::Sender<Work>) {
        let message = match Message::classify(doc) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping message: {}", e);
                return;
            }
        };

        match message {
            Message::Request(request) if request.is_echo() => {
                match Encoder::encode_response(&request.echo_reply()) {
                    Ok(bytes) => {
                        if self.sink.send(bytes).await.is_err() {
                            debug!("write sink closed, echo reply dropped");
                        }
                    }
                    Err(e) => warn!("failed to encode echo reply: {}", e),
                }
            }
            Message::Request(request) => {
                warn!("ignoring unsupported request '{}'", request.method);
            }
            Message::Notification(notification) => {
                if !self.hand_off(Work::Notification(notification), work_tx).await {
                    debug!("worker stopped, notification dropped");
                }
            }
            Message::Response(response) => self.complete(response, work_tx).await,
        }
    }

    /// Queues work for the worker. Only waits when the queue is full, and
    /// gives up when the connection shuts down. Returns false if the work
    /// was dropped.
    async fn hand_off(&self, work: Work, work_tx: &mpsc::Sender<Work>) -> bool {
        let work = match work_tx.try_send(work) {
            Ok(()) => return true,
            Err(TrySendError::Closed(_)) => return false,
            Err(TrySendError::Full(work)) => work,
        };

        let stalls = self.queue_stalls.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "worker queue full ({} slots), reader waiting (stall #{})",
            self.config.worker_queue, stalls
        );
        tokio::select! {
            biased;
            _ = self.shutdown.notified() => false,
            sent = work_tx.send(work) => sent.is_ok(),
        }
    }

    async fn complete(&self, response: Response, work_tx: &mpsc::Sender<Work>) {
        let key = response.id_key();
        let call = self.pending.lock().remove(&key);
        let Some(call) = call else {
            debug!("no pending call for response id={}", key);
            return;
        };

        match call.monitor_id {
            Some(monitor_id) if response.is_ok() => {
                let work = Work::MonitorReply {
                    monitor_id,
                    response,
                    reply: call.reply,
                };
                // A dropped reply fails the call with ConnectionClosed.
                if !self.hand_off(work, work_tx).await {
                    debug!("worker stopped, monitor reply dropped");
                }
            }
            _ => {
                let _ = call.reply.send(Ok(response));
            }
        }
    }
}

async fn read_loop(
    conn: Arc<Connection>,
    mut source: mpsc::Receiver<Bytes>,
    work_tx: mpsc::Sender<Work>,
) {
    let mut decoder = FrameDecoder::new(conn.config.max_frame_length);
    let mut docs = Vec::new();

    loop {
        if conn.is_closed() {
            break;
        }

        let chunk = tokio::select! {
            biased;
            _ = conn.shutdown.notified() => break,
            chunk = source.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!("byte source ended");
            conn.close(Some(Fault::TransportClosed));
            break;
        };

        let result = decoder.feed_into(&chunk, &mut docs);
        for doc in docs.drain(..) {
            conn.dispatch(doc, &work_tx).await;
        }

        if let Err(err) = result {
            match Fault::from_protocol(&err) {
                Some(fault) => {
                    conn.close(Some(fault));
                    break;
                }
                None => warn!("framing error: {}", err),
            }
        }
    }

    if decoder.buffered() > 0 {
        debug!("discarding {} bytes of a partial frame", decoder.buffered());
    }
    decoder.discard();
    debug!(
        "read loop stopped after {} frames ({} dropped)",
        decoder.frames_decoded(),
        decoder.frames_dropped()
    );
}

async fn work_loop(conn: Arc<Connection>, mut work_rx: mpsc::Receiver<Work>) {
    while let Some(work) = work_rx.recv().await {
        match work {
            Work::Notification(notification) => match conn.router.route(&notification) {
                Ok(Some(update)) => {
                    let _ = conn.events.send(ConnectionEvent::Update(Arc::new(update)));
                }
                Ok(None) => {}
                Err(e) => warn!("dropping '{}' notification: {}", notification.method, e),
            },
            Work::MonitorReply {
                monitor_id,
                response,
                reply,
            } => match conn.router.bootstrap(&monitor_id, &response.result) {
                Ok(snapshot) => {
                    debug!("monitor installed with {} rows", snapshot.row_count());
                    if !conn.is_closed() {
                        conn.transition(ConnectionState::Monitoring);
                    }
                    let _ = reply.send(Ok(response));
                }
                Err(e) => {
                    let _ = reply.send(Err(e.into()));
                }
            },
        }
    }
    debug!("worker stopped");
}

/// Extracts `(database, monitor id)` from `monitor` params.
fn monitor_target(params: &Value) -> Result<(String, Value), ClientError> {
    match params.as_array().map(Vec::as_slice) {
        Some([Value::String(db), monitor_id, _requests]) => Ok((db.clone(), monitor_id.clone())),
        _ => Err(ClientError::InvalidParams(
            "monitor expects [database, monitor-id, monitor-requests]".into(),
        )),
    }
}

/// Handle to a running connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn: Arc<Connection>,
}

impl ConnectionHandle {
    /// Sends a JSON-RPC request and waits for its result.
    ///
    /// A successful `monitor` call installs its initial rows into the cache
    /// before returning, and moves the connection to MONITORING.
    pub async fn call(&self, method: impl Into<String>, params: Value) -> Result<Value, ClientError> {
        let request = Request::new(method, params);
        let monitor_id = if request.method == MONITOR_METHOD {
            let (db, monitor_id) = monitor_target(&request.params)?;
            self.conn.router.register_monitor(&monitor_id, db);
            Some(monitor_id)
        } else {
            None
        };

        let result = self.round_trip(request, monitor_id.clone()).await;
        if let (Some(monitor_id), Err(e)) = (&monitor_id, &result) {
            debug!("monitor {} failed: {}", monitor_id, e);
            self.conn.router.unregister_monitor(monitor_id);
        }
        result
    }

    async fn round_trip(
        &self,
        request: Request,
        monitor_id: Option<Value>,
    ) -> Result<Value, ClientError> {
        let key = request.id_key();
        let encoded = Encoder::encode_request(&request)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.conn.pending.lock();
            if self.conn.is_closed() {
                return Err(ClientError::ConnectionClosed);
            }
            pending.insert(
                key.clone(),
                PendingCall {
                    reply: tx,
                    monitor_id,
                },
            );
        }

        debug!("sending '{}' id={} ({} bytes)", request.method, key, encoded.len());
        if self.conn.sink.send(encoded).await.is_err() {
            self.conn.pending.lock().remove(&key);
            return Err(ClientError::ConnectionClosed);
        }

        let response = match tokio::time::timeout(self.conn.config.request_timeout(), rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!("call id={} timed out", key);
                self.conn.pending.lock().remove(&key);
                return Err(ClientError::Timeout);
            }
        };

        match response.rpc_error() {
            Some(err) => Err(ClientError::Rpc(err)),
            None => Ok(response.result),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.conn.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state.lock().state()
    }

    /// The connection's table cache.
    pub fn store(&self) -> &Arc<DatabaseStore> {
        self.conn.router.store()
    }

    pub fn codec(&self) -> &ValueCodec {
        self.conn.router.codec()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.conn.config
    }

    pub fn pending_count(&self) -> usize {
        self.conn.pending.lock().len()
    }

    /// Number of times the read task found the worker queue full.
    pub fn queue_stalls(&self) -> u64 {
        self.conn.queue_stalls.load(Ordering::Relaxed)
    }

    /// Closes the connection locally. Feeding stops and pending calls fail.
    pub fn close(&self) {
        self.conn.close(None);
    }

    /// Waits until the connection is CLOSED.
    pub async fn closed(&self) {
        let mut rx = self.conn.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }
}
