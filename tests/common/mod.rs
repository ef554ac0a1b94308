//! In-process fake engine used by the bridge integration tests.
//!
//! Behaves like the real thing where the bridge can tell the difference:
//! calls are recorded with their arguments, `connect` can be gated so it
//! blocks until the test releases it, events are fired through the installed
//! sink from any thread the test likes, and publish tokens block their
//! waiters until completed from elsewhere.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mqtt_bridge::{
    ConnectOptions, DeliveryToken, Engine, EventSink, Message, MessageId, QoS, TlsOptions,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fake engine: {0}")]
pub struct FakeError(pub String);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Acknowledgement token whose blocking wait is released by
/// [`FakeToken::complete`], typically from another thread.
#[derive(Clone)]
pub struct FakeToken {
    message_id: MessageId,
    state: Arc<TokenState>,
}

struct TokenState {
    outcome: Mutex<Option<Result<(), FakeError>>>,
    done: Condvar,
}

impl FakeToken {
    fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            state: Arc::new(TokenState {
                outcome: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// Mark the publish as acknowledged, waking every blocked waiter.
    pub fn complete(&self, outcome: Result<(), FakeError>) {
        *lock(&self.state.outcome) = Some(outcome);
        self.state.done.notify_all();
    }
}

impl DeliveryToken for FakeToken {
    type Error = FakeError;

    fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn is_published(&self) -> bool {
        lock(&self.state.outcome).is_some()
    }

    fn wait_for_publish(&self) -> Result<(), FakeError> {
        let mut outcome = lock(&self.state.outcome);
        loop {
            match outcome.as_ref() {
                Some(result) => return result.clone(),
                None => {
                    outcome = self
                        .state
                        .done
                        .wait(outcome)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<String>>,
    sink: Mutex<Option<Box<dyn EventSink>>>,
    sink_installs: AtomicUsize,
    message_sinks: Mutex<HashMap<String, Box<dyn FnMut(Message) + Send>>>,
    tokens: Mutex<Vec<FakeToken>>,
    connect_gate: Mutex<Option<Receiver<()>>>,
    connect_error: Mutex<Option<FakeError>>,
    disconnected: Mutex<bool>,
    disconnect_signal: Condvar,
    next_mid: AtomicU16,
}

/// Cloneable fake engine; clones share all state, so tests can keep a handle
/// for firing events and inspecting calls after handing one to the bridge.
#[derive(Default, Clone)]
pub struct FakeEngine {
    shared: Arc<Shared>,
}

impl FakeEngine {
    /// Everything invoked on the engine so far, with arguments.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.shared.calls).clone()
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.shared.calls).push(call.into());
    }

    /// Make `connect` block until the paired sender fires.
    pub fn set_connect_gate(&self, gate: Receiver<()>) {
        *lock(&self.shared.connect_gate) = Some(gate);
    }

    /// Make the next `connect` fail.
    pub fn set_connect_error(&self, error: FakeError) {
        *lock(&self.shared.connect_error) = Some(error);
    }

    /// How many times an event sink has been installed.
    pub fn sink_installs(&self) -> usize {
        self.shared.sink_installs.load(Ordering::SeqCst)
    }

    /// Invoke the installed event sink, as the engine's worker thread would.
    pub fn fire(&self, fire: impl FnOnce(&dyn EventSink)) {
        if let Some(sink) = lock(&self.shared.sink).as_deref() {
            fire(sink);
        }
    }

    /// Route a message through a registered per-filter sink.
    pub fn fire_filtered(&self, filter: &str, message: Message) {
        if let Some(sink) = lock(&self.shared.message_sinks).get_mut(filter) {
            sink(message);
        }
    }

    pub fn has_message_sink(&self, filter: &str) -> bool {
        lock(&self.shared.message_sinks).contains_key(filter)
    }

    /// The token returned for the publish with `message_id`, if any.
    pub fn token(&self, message_id: MessageId) -> Option<FakeToken> {
        lock(&self.shared.tokens)
            .iter()
            .find(|token| token.message_id() == message_id)
            .cloned()
    }

    /// Inherent surface deliberately not covered by the bridge, for the
    /// fallthrough tests.
    pub fn marker(&self) -> &'static str {
        "fake-engine"
    }

    fn next_mid(&self) -> MessageId {
        self.shared.next_mid.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Engine for FakeEngine {
    type Error = FakeError;
    type Token = FakeToken;

    fn set_event_sink(&self, sink: Box<dyn EventSink>) {
        *lock(&self.shared.sink) = Some(sink);
        self.shared.sink_installs.fetch_add(1, Ordering::SeqCst);
    }

    fn add_message_sink(&self, filter: &str, sink: Box<dyn FnMut(Message) + Send>) {
        self.record(format!("add_message_sink {filter}"));
        lock(&self.shared.message_sinks).insert(filter.to_owned(), sink);
    }

    fn remove_message_sink(&self, filter: &str) {
        self.record(format!("remove_message_sink {filter}"));
        lock(&self.shared.message_sinks).remove(filter);
    }

    fn connect(&self, options: &ConnectOptions) -> Result<(), FakeError> {
        self.record(format!("connect {}:{}", options.host, options.port));
        if let Some(error) = lock(&self.shared.connect_error).take() {
            return Err(error);
        }
        if let Some(gate) = lock(&self.shared.connect_gate).as_ref() {
            let _ = gate.recv();
        }
        Ok(())
    }

    fn connect_srv(&self, domain: &str, _keep_alive: Duration) -> Result<(), FakeError> {
        self.record(format!("connect_srv {domain}"));
        Ok(())
    }

    fn reconnect(&self) -> Result<(), FakeError> {
        self.record("reconnect");
        Ok(())
    }

    fn loop_forever(&self) -> Result<(), FakeError> {
        self.record("loop_forever");
        let mut disconnected = lock(&self.shared.disconnected);
        while !*disconnected {
            disconnected = self
                .shared
                .disconnect_signal
                .wait(disconnected)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn loop_start(&self) -> Result<(), FakeError> {
        self.record("loop_start");
        Ok(())
    }

    fn loop_stop(&self) -> Result<(), FakeError> {
        self.record("loop_stop");
        Ok(())
    }

    fn publish(&self, message: &Message) -> Result<FakeToken, FakeError> {
        let token = FakeToken::new(self.next_mid());
        self.record(format!(
            "publish {} {} bytes mid={}",
            message.topic,
            message.payload.len(),
            token.message_id()
        ));
        lock(&self.shared.tokens).push(token.clone());
        Ok(token)
    }

    fn subscribe(&self, filter: &str, qos: QoS) -> Result<MessageId, FakeError> {
        self.record(format!("subscribe {filter} {qos:?}"));
        Ok(self.next_mid())
    }

    fn unsubscribe(&self, filter: &str) -> Result<MessageId, FakeError> {
        self.record(format!("unsubscribe {filter}"));
        Ok(self.next_mid())
    }

    fn disconnect(&self) -> Result<(), FakeError> {
        self.record("disconnect");
        *lock(&self.shared.disconnected) = true;
        self.shared.disconnect_signal.notify_all();
        self.fire(|sink| sink.on_disconnect(0));
        Ok(())
    }

    fn set_credentials(&self, username: &str, password: Option<&[u8]>) {
        self.record(format!(
            "set_credentials {username} password={}",
            password.is_some()
        ));
    }

    fn set_tls(&self, options: &TlsOptions) -> Result<(), FakeError> {
        self.record(format!("set_tls insecure={}", options.insecure));
        Ok(())
    }

    fn set_reconnect_delay(&self, min: Duration, max: Duration) {
        self.record(format!(
            "set_reconnect_delay {}..{}",
            min.as_secs(),
            max.as_secs()
        ));
    }

    fn set_max_inflight(&self, limit: u32) {
        self.record(format!("set_max_inflight {limit}"));
    }

    fn set_max_queued(&self, limit: u32) {
        self.record(format!("set_max_queued {limit}"));
    }

    fn enable_logger(&self, enabled: bool) {
        self.record(format!("enable_logger {enabled}"));
    }
}
