//! Contracts consumed from the wrapped MQTT engine.
//!
//! The bridge does not implement any MQTT protocol logic itself. It talks to
//! an "engine": a client object (typically a binding over a native MQTT
//! library) that runs its own network loop on a private worker thread,
//! accepts non-blocking queue submissions, blocks the caller for connection
//! establishment, and fires event callbacks from whatever thread its loop
//! happens to run on. These traits pin down exactly the surface the bridge
//! relies on.

use std::time::Duration;

/// Packet identifier assigned by the engine to subscribe/unsubscribe/publish
/// requests, echoed back in the matching acknowledgement event.
pub type MessageId = u16;

/// Raw return/reason code reported by the engine, passed through unmodified.
/// The numeric space is the engine's own; the bridge assigns no meaning to it.
pub type ReasonCode = u8;

/// Delivery quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// QoS 0 — at most once
    AtMostOnce,
    /// QoS 1 — at least once
    AtLeastOnce,
    /// QoS 2 — exactly once
    ExactlyOnce,
}

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// An application message, both outgoing (publish) and incoming (delivery).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    /// Create a QoS 0, non-retained message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Parameters for establishing a connection to a broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker hostname or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Keep-alive interval negotiated with the broker
    pub keep_alive: Duration,
    /// Local address to bind the outgoing socket to, if any
    pub bind_address: Option<String>,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 1883,
            keep_alive: Duration::from_secs(60),
            bind_address: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// TLS parameters handed to the engine verbatim. Certificate handling and
/// the handshake itself are the engine's business.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    /// Skip server certificate verification
    pub insecure: bool,
}

/// Receiver for engine events.
///
/// The bridge installs exactly one sink on the engine at construction time.
/// The engine invokes these methods from its own worker thread; every
/// implementation must therefore be cheap and non-blocking, and must never
/// wait on work scheduled back onto the caller's runtime.
pub trait EventSink: Send + Sync {
    /// Connection handshake finished. `session_present` and `code` are the
    /// engine's CONNACK view, unmodified.
    fn on_connect(&self, session_present: bool, code: ReasonCode);
    /// Connection lost or closed.
    fn on_disconnect(&self, code: ReasonCode);
    /// An application message arrived on a subscribed topic.
    fn on_message(&self, message: Message);
    /// An outgoing publish completed its QoS handshake.
    fn on_publish(&self, message_id: MessageId);
    /// A subscribe request was acknowledged with the granted QoS levels.
    fn on_subscribe(&self, message_id: MessageId, granted: Vec<QoS>);
    /// An unsubscribe request was acknowledged.
    fn on_unsubscribe(&self, message_id: MessageId);
    /// The engine emitted an internal log line.
    fn on_log(&self, level: LogLevel, line: &str);
}

/// Acknowledgement handle returned by [`Engine::publish`].
///
/// `wait_for_publish` blocks the calling thread until the engine finishes
/// the QoS handshake for this message; the bridge never calls it directly
/// on a runtime thread (see [`PublishToken`](crate::PublishToken)).
pub trait DeliveryToken: Send + Sync + 'static {
    type Error: std::error::Error + Send + 'static;

    /// Packet identifier of the publish this token tracks.
    fn message_id(&self) -> MessageId;

    /// Whether the publish has already been acknowledged.
    fn is_published(&self) -> bool;

    /// Block until the publish is acknowledged, returning the engine's
    /// completion value.
    fn wait_for_publish(&self) -> Result<(), Self::Error>;
}

/// The wrapped MQTT client engine.
///
/// All methods take `&self`: engines of this shape keep their mutable state
/// behind their own synchronization because their worker thread touches it
/// concurrently with callers. The bridge adds no locking of its own around
/// engine calls; an engine that is not safe for concurrent use must document
/// that obligation to its callers.
///
/// The methods fall into three groups, and the bridge treats each group
/// differently (see [`AsyncClient`](crate::AsyncClient)):
///
/// * wiring (`set_event_sink`, `add_message_sink`, `remove_message_sink`) —
///   called by the bridge itself;
/// * blocking calls (`connect`, `connect_srv`, `reconnect`, `loop_forever`)
///   — offloaded to a blocking worker;
/// * queue submissions and local configuration (everything else) — forwarded
///   directly, they must not block.
pub trait Engine: Send + Sync + 'static {
    /// Error type for fallible engine operations. Propagated to bridge
    /// callers unchanged.
    type Error: std::error::Error + Send + 'static;

    /// Native publish acknowledgement handle.
    type Token: DeliveryToken<Error = Self::Error>;

    /// Install the event sink. Called once, before any other bridge call.
    /// Replaces any previously installed sink.
    fn set_event_sink(&self, sink: Box<dyn EventSink>);

    /// Register a per-filter message sink. Messages matching `filter` are
    /// routed to `sink` instead of the general `on_message` event; matching
    /// semantics are the engine's. Registering the same filter again
    /// replaces the sink.
    fn add_message_sink(&self, filter: &str, sink: Box<dyn FnMut(Message) + Send>);

    /// Remove a per-filter message sink. Unknown filters are a no-op.
    fn remove_message_sink(&self, filter: &str);

    /// Connect to the broker. Blocks until the TCP/TLS connection is up (the
    /// MQTT handshake result still arrives via `on_connect`).
    fn connect(&self, options: &ConnectOptions) -> Result<(), Self::Error>;

    /// Connect via DNS SRV service discovery for `domain`. Blocks like
    /// `connect`.
    fn connect_srv(&self, domain: &str, keep_alive: Duration) -> Result<(), Self::Error>;

    /// Re-establish the previous connection. Blocks like `connect`.
    fn reconnect(&self) -> Result<(), Self::Error>;

    /// Drive the network loop on the calling thread until `disconnect` (or a
    /// fatal error) ends it.
    fn loop_forever(&self) -> Result<(), Self::Error>;

    /// Start the engine's internal network loop thread.
    fn loop_start(&self) -> Result<(), Self::Error>;

    /// Stop the engine's internal network loop thread.
    fn loop_stop(&self) -> Result<(), Self::Error>;

    /// Queue a message for sending. Returns the acknowledgement token
    /// immediately; delivery happens on the engine's loop.
    fn publish(&self, message: &Message) -> Result<Self::Token, Self::Error>;

    /// Queue a subscribe request, returning its packet identifier.
    fn subscribe(&self, filter: &str, qos: QoS) -> Result<MessageId, Self::Error>;

    /// Queue an unsubscribe request, returning its packet identifier.
    fn unsubscribe(&self, filter: &str) -> Result<MessageId, Self::Error>;

    /// Queue a disconnect request.
    fn disconnect(&self) -> Result<(), Self::Error>;

    /// Set the username/password sent on the next connect.
    fn set_credentials(&self, username: &str, password: Option<&[u8]>);

    /// Configure TLS for subsequent connects.
    fn set_tls(&self, options: &TlsOptions) -> Result<(), Self::Error>;

    /// Bound the delay between automatic reconnect attempts.
    fn set_reconnect_delay(&self, min: Duration, max: Duration);

    /// Limit the number of QoS>0 messages in flight at once.
    fn set_max_inflight(&self, limit: u32);

    /// Limit the number of outgoing messages held in the send queue.
    fn set_max_queued(&self, limit: u32);

    /// Enable or disable `on_log` emission.
    fn enable_logger(&self, enabled: bool);
}
