//! The concurrency bridge: an async client handle over a blocking,
//! callback-driven engine.
//!
//! Two threads of control meet here. User code runs as tokio tasks; the
//! engine fires callbacks from its own worker thread. Events cross over
//! through an unbounded channel drained by a dispatcher task on the runtime
//! (firing order is preserved per event, and the engine thread never waits
//! on delivery), while the engine's blocking calls cross the other way via
//! `spawn_blocking` so they suspend only the calling task.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::{
    ConnectOptions, Engine, EventSink, LogLevel, Message, MessageId, QoS, ReasonCode, TlsOptions,
};
use crate::error::NoSchedulerError;
use crate::slot::Slot;
use crate::token::PublishToken;

/// Callback for connection-established events: `(client, session_present,
/// return_code)`.
pub type ConnectCallback<E> = Box<dyn FnMut(&AsyncClient<E>, bool, ReasonCode) + Send>;
/// Callback for disconnection events: `(client, return_code)`.
pub type DisconnectCallback<E> = Box<dyn FnMut(&AsyncClient<E>, ReasonCode) + Send>;
/// Callback for received messages: `(client, message)`.
pub type MessageCallback<E> = Box<dyn FnMut(&AsyncClient<E>, Message) + Send>;
/// Callback for publish acknowledgements: `(client, message_id)`.
pub type PublishCallback<E> = Box<dyn FnMut(&AsyncClient<E>, MessageId) + Send>;
/// Callback for subscribe acknowledgements: `(client, message_id,
/// granted_qos)`.
pub type SubscribeCallback<E> = Box<dyn FnMut(&AsyncClient<E>, MessageId, Vec<QoS>) + Send>;
/// Callback for unsubscribe acknowledgements: `(client, message_id)`.
pub type UnsubscribeCallback<E> = Box<dyn FnMut(&AsyncClient<E>, MessageId) + Send>;
/// Callback for engine log lines: `(client, level, line)`.
pub type LogCallback<E> = Box<dyn FnMut(&AsyncClient<E>, LogLevel, &str) + Send>;

/// Engine events as they travel from the engine's thread to the dispatcher.
enum Event {
    Connected { session_present: bool, code: ReasonCode },
    Disconnected { code: ReasonCode },
    Message(Message),
    Published { message_id: MessageId },
    Subscribed { message_id: MessageId, granted: Vec<QoS> },
    Unsubscribed { message_id: MessageId },
    Log { level: LogLevel, line: String },
    Filtered { filter: String, message: Message },
}

/// The fixed forwarding function installed on the engine. Sending on an
/// unbounded channel never blocks, so the engine's thread is never held up
/// by slow consumers; a send after the dispatcher has gone is dropped.
struct ChannelSink {
    events: UnboundedSender<Event>,
}

impl EventSink for ChannelSink {
    fn on_connect(&self, session_present: bool, code: ReasonCode) {
        let _ = self.events.send(Event::Connected {
            session_present,
            code,
        });
    }

    fn on_disconnect(&self, code: ReasonCode) {
        let _ = self.events.send(Event::Disconnected { code });
    }

    fn on_message(&self, message: Message) {
        let _ = self.events.send(Event::Message(message));
    }

    fn on_publish(&self, message_id: MessageId) {
        let _ = self.events.send(Event::Published { message_id });
    }

    fn on_subscribe(&self, message_id: MessageId, granted: Vec<QoS>) {
        let _ = self.events.send(Event::Subscribed {
            message_id,
            granted,
        });
    }

    fn on_unsubscribe(&self, message_id: MessageId) {
        let _ = self.events.send(Event::Unsubscribed { message_id });
    }

    fn on_log(&self, level: LogLevel, line: &str) {
        let _ = self.events.send(Event::Log {
            level,
            line: line.to_owned(),
        });
    }
}

/// User-assignable callback slots, one per event name.
struct Slots<E: Engine> {
    on_connect: Slot<ConnectCallback<E>>,
    on_disconnect: Slot<DisconnectCallback<E>>,
    on_message: Slot<MessageCallback<E>>,
    on_publish: Slot<PublishCallback<E>>,
    on_subscribe: Slot<SubscribeCallback<E>>,
    on_unsubscribe: Slot<UnsubscribeCallback<E>>,
    on_log: Slot<LogCallback<E>>,
}

impl<E: Engine> Default for Slots<E> {
    fn default() -> Self {
        Self {
            on_connect: Slot::default(),
            on_disconnect: Slot::default(),
            on_message: Slot::default(),
            on_publish: Slot::default(),
            on_subscribe: Slot::default(),
            on_unsubscribe: Slot::default(),
            on_log: Slot::default(),
        }
    }
}

struct Inner<E: Engine> {
    engine: E,
    scheduler: Handle,
    slots: Slots<E>,
    /// Per-filter message callbacks, keyed by the filter string registered
    /// with the engine.
    filtered: Mutex<HashMap<String, Arc<Slot<MessageCallback<E>>>>>,
    /// Sender side of the event channel, kept for wiring up additional
    /// per-filter sinks after construction.
    events: UnboundedSender<Event>,
}

impl<E: Engine> Inner<E> {
    fn filtered(&self) -> MutexGuard<'_, HashMap<String, Arc<Slot<MessageCallback<E>>>>> {
        self.filtered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Async handle over a blocking, callback-driven MQTT engine.
///
/// Differences from using the engine directly:
///
/// * the blocking calls (`connect`, `connect_srv`, `reconnect`,
///   `loop_forever`) become `async fn`s that suspend only the calling task;
/// * engine callbacks are delivered on the runtime instead of the engine's
///   worker thread, in firing order, to whatever callback currently occupies
///   the matching slot;
/// * [`publish`](Self::publish) returns a [`PublishToken`] whose
///   acknowledgement wait is cooperative.
///
/// Everything else forwards to the engine unchanged, either through the
/// explicit passthrough methods or, for surface the bridge does not know
/// about, through `Deref`. Cloning is cheap and yields another handle to the
/// same engine.
pub struct AsyncClient<E: Engine> {
    inner: Arc<Inner<E>>,
}

impl<E: Engine> std::fmt::Debug for AsyncClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient").finish_non_exhaustive()
    }
}

impl<E: Engine> Clone for AsyncClient<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> AsyncClient<E> {
    /// Wrap `engine`, binding it to the tokio runtime of the calling
    /// context.
    ///
    /// Fails with [`NoSchedulerError`] when called from outside a runtime.
    /// Does not block and performs no network I/O; the engine's loop is
    /// started separately (`loop_start`, `loop_forever`).
    pub fn new(engine: E) -> Result<Self, NoSchedulerError> {
        let scheduler = Handle::try_current().map_err(|_| NoSchedulerError)?;
        Ok(Self::with_scheduler(scheduler, engine))
    }

    /// Wrap `engine`, binding it to an explicitly supplied runtime handle.
    pub fn with_scheduler(scheduler: Handle, engine: E) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        engine.set_event_sink(Box::new(ChannelSink {
            events: events.clone(),
        }));

        let inner = Arc::new(Inner {
            engine,
            scheduler: scheduler.clone(),
            slots: Slots::default(),
            filtered: Mutex::new(HashMap::new()),
            events,
        });

        // The dispatcher holds only a weak reference: dropping the last
        // client handle drops the engine, which closes the channel and ends
        // the task.
        scheduler.spawn(dispatch_events(Arc::downgrade(&inner), receiver));

        Self { inner }
    }

    /// The wrapped engine. Surface not covered by the bridge (also reachable
    /// via `Deref`) carries no concurrency adaptation: blocking engine
    /// methods called this way block the runtime thread.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// The runtime handle this client is bound to.
    pub fn scheduler(&self) -> &Handle {
        &self.inner.scheduler
    }

    /// Whether two handles refer to the same wrapped engine.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Blocking engine calls, adapted to suspend only the calling task.
    //
    // Each runs the engine call on a blocking worker. Concurrent calls get
    // concurrent workers; the bridge adds no mutual exclusion. Dropping the
    // returned future abandons the result but the engine call itself runs
    // to completion, as the engine cannot be interrupted. A caller still
    // suspended when the runtime shuts down panics (see `run_blocking`).
    // ------------------------------------------------------------------

    /// Connect to the broker. See [`Engine::connect`].
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), E::Error> {
        let inner = Arc::clone(&self.inner);
        run_blocking(&self.inner.scheduler, move || inner.engine.connect(&options)).await
    }

    /// Connect via DNS SRV service discovery. See [`Engine::connect_srv`].
    pub async fn connect_srv(
        &self,
        domain: impl Into<String>,
        keep_alive: Duration,
    ) -> Result<(), E::Error> {
        let domain = domain.into();
        let inner = Arc::clone(&self.inner);
        run_blocking(&self.inner.scheduler, move || {
            inner.engine.connect_srv(&domain, keep_alive)
        })
        .await
    }

    /// Re-establish a dropped connection. See [`Engine::reconnect`].
    pub async fn reconnect(&self) -> Result<(), E::Error> {
        let inner = Arc::clone(&self.inner);
        run_blocking(&self.inner.scheduler, move || inner.engine.reconnect()).await
    }

    /// Drive the engine's network loop until `disconnect` ends it. The loop
    /// runs on a blocking worker; only the calling task is suspended.
    pub async fn loop_forever(&self) -> Result<(), E::Error> {
        let inner = Arc::clone(&self.inner);
        run_blocking(&self.inner.scheduler, move || inner.engine.loop_forever()).await
    }

    // ------------------------------------------------------------------
    // Passthrough: non-blocking queue submissions and local configuration,
    // forwarded verbatim with the engine's result returned unchanged.
    // ------------------------------------------------------------------

    pub fn loop_start(&self) -> Result<(), E::Error> {
        self.inner.engine.loop_start()
    }

    pub fn loop_stop(&self) -> Result<(), E::Error> {
        self.inner.engine.loop_stop()
    }

    pub fn subscribe(&self, filter: &str, qos: QoS) -> Result<MessageId, E::Error> {
        self.inner.engine.subscribe(filter, qos)
    }

    pub fn unsubscribe(&self, filter: &str) -> Result<MessageId, E::Error> {
        self.inner.engine.unsubscribe(filter)
    }

    pub fn disconnect(&self) -> Result<(), E::Error> {
        self.inner.engine.disconnect()
    }

    pub fn set_credentials(&self, username: &str, password: Option<&[u8]>) {
        self.inner.engine.set_credentials(username, password);
    }

    pub fn set_tls(&self, options: &TlsOptions) -> Result<(), E::Error> {
        self.inner.engine.set_tls(options)
    }

    pub fn set_reconnect_delay(&self, min: Duration, max: Duration) {
        self.inner.engine.set_reconnect_delay(min, max);
    }

    pub fn set_max_inflight(&self, limit: u32) {
        self.inner.engine.set_max_inflight(limit);
    }

    pub fn set_max_queued(&self, limit: u32) {
        self.inner.engine.set_max_queued(limit);
    }

    pub fn enable_logger(&self, enabled: bool) {
        self.inner.engine.enable_logger(enabled);
    }

    // ------------------------------------------------------------------
    // Publish.
    // ------------------------------------------------------------------

    /// Queue a message for sending. Returns as soon as the engine has
    /// accepted it; the returned token tracks the acknowledgement and offers
    /// a cooperative [`wait_for_publish`](PublishToken::wait_for_publish).
    pub fn publish(&self, message: Message) -> Result<PublishToken<E::Token>, E::Error> {
        let token = self.inner.engine.publish(&message)?;
        Ok(PublishToken::new(token, self.inner.scheduler.clone()))
    }

    // ------------------------------------------------------------------
    // Callback slots. Initially unset; events arriving while a slot is
    // unset are silently dropped. Assigning a slot never touches the
    // engine: the forwarding sink was installed once at construction and
    // reads the slot at delivery time, on the runtime.
    // ------------------------------------------------------------------

    pub fn set_on_connect(&self, callback: Option<ConnectCallback<E>>) {
        self.inner.slots.on_connect.set(callback);
    }

    pub fn set_on_disconnect(&self, callback: Option<DisconnectCallback<E>>) {
        self.inner.slots.on_disconnect.set(callback);
    }

    pub fn set_on_message(&self, callback: Option<MessageCallback<E>>) {
        self.inner.slots.on_message.set(callback);
    }

    pub fn set_on_publish(&self, callback: Option<PublishCallback<E>>) {
        self.inner.slots.on_publish.set(callback);
    }

    pub fn set_on_subscribe(&self, callback: Option<SubscribeCallback<E>>) {
        self.inner.slots.on_subscribe.set(callback);
    }

    pub fn set_on_unsubscribe(&self, callback: Option<UnsubscribeCallback<E>>) {
        self.inner.slots.on_unsubscribe.set(callback);
    }

    pub fn set_on_log(&self, callback: Option<LogCallback<E>>) {
        self.inner.slots.on_log.set(callback);
    }

    // ------------------------------------------------------------------
    // Per-filter message callbacks.
    // ------------------------------------------------------------------

    /// Register `callback` for messages matching `filter`. Matching is done
    /// by the engine; matched messages bypass the `on_message` slot. The
    /// callback is delivered on the runtime like any slot callback.
    /// Registering the same filter again replaces the callback.
    pub fn message_callback_add(&self, filter: &str, callback: MessageCallback<E>) {
        let slot = Arc::new(Slot::default());
        slot.set(Some(callback));
        self.inner.filtered().insert(filter.to_owned(), slot);

        let events = self.inner.events.clone();
        let filter_key = filter.to_owned();
        self.inner.engine.add_message_sink(
            filter,
            Box::new(move |message| {
                let _ = events.send(Event::Filtered {
                    filter: filter_key.clone(),
                    message,
                });
            }),
        );
    }

    /// Remove a per-filter callback. Unknown filters are a no-op.
    pub fn message_callback_remove(&self, filter: &str) {
        self.inner.engine.remove_message_sink(filter);
        self.inner.filtered().remove(filter);
    }

    /// Deliver one event to whatever callback currently occupies the
    /// matching slot. Runs on the dispatcher task.
    fn deliver(&self, event: Event) {
        let slots = &self.inner.slots;
        match event {
            Event::Connected {
                session_present,
                code,
            } => {
                slots
                    .on_connect
                    .invoke(move |f| f(self, session_present, code));
            }
            Event::Disconnected { code } => {
                slots.on_disconnect.invoke(move |f| f(self, code));
            }
            Event::Message(message) => {
                slots.on_message.invoke(move |f| f(self, message));
            }
            Event::Published { message_id } => {
                slots.on_publish.invoke(move |f| f(self, message_id));
            }
            Event::Subscribed {
                message_id,
                granted,
            } => {
                slots
                    .on_subscribe
                    .invoke(move |f| f(self, message_id, granted));
            }
            Event::Unsubscribed { message_id } => {
                slots.on_unsubscribe.invoke(move |f| f(self, message_id));
            }
            Event::Log { level, line } => {
                slots.on_log.invoke(move |f| f(self, level, &line));
            }
            Event::Filtered { filter, message } => {
                let slot = self.inner.filtered().get(&filter).cloned();
                match slot {
                    Some(slot) => {
                        slot.invoke(move |f| f(self, message));
                    }
                    // Removed after the engine already forwarded the
                    // message; late deliveries are dropped like unset slots.
                    None => log::trace!("dropping message for removed filter {filter:?}"),
                }
            }
        }
    }
}

/// Fallback for engine surface the bridge does not wrap. No adaptation is
/// applied: whatever the engine method does on the calling thread, it does
/// here too.
impl<E: Engine> Deref for AsyncClient<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.inner.engine
    }
}

/// Drain the event channel in submission order, so callbacks observe events
/// in exactly the order the engine fired them.
async fn dispatch_events<E: Engine>(inner: Weak<Inner<E>>, mut events: UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        let client = AsyncClient { inner };
        client.deliver(event);
    }
    log::debug!("engine event dispatcher stopped");
}

/// Run a blocking engine call on the runtime's blocking pool, suspending
/// only the calling task. A panic inside the call resumes on the caller.
///
/// The only other way the worker can fail to produce a value is the runtime
/// shutting down before it ran; there is no engine result to return in that
/// case, so the suspended caller panics with the abort reason. Tasks still
/// alive during shutdown are being torn down anyway, so this surfaces only
/// when a blocking call is awaited from outside the runtime's own tasks.
pub(crate) async fn run_blocking<T, F>(scheduler: &Handle, call: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match scheduler.spawn_blocking(call).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => panic!("blocking engine call aborted: {err}"),
    }
}
