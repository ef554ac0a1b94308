//! Async bridge over blocking, callback-driven MQTT client engines.
//!
//! MQTT client libraries of the classic shape run their network loop on a
//! private worker thread, block the caller for connection establishment,
//! and fire event callbacks from whatever thread that loop happens to be
//! on. None of that mixes well with a tokio application: blocking calls
//! stall the runtime, and callbacks land on a foreign thread.
//!
//! This crate adapts between the two worlds without reimplementing any of
//! the protocol. Wrap an [`Engine`] in an [`AsyncClient`] and:
//!
//! * blocking calls (`connect`, `connect_srv`, `reconnect`, `loop_forever`)
//!   become `async fn`s that suspend only the calling task;
//! * callbacks are re-delivered on the runtime, in firing order, with the
//!   client handle as their first argument;
//! * [`AsyncClient::publish`] returns a [`PublishToken`] whose
//!   acknowledgement wait is cooperative;
//! * everything else passes through to the engine unchanged.
//!
//! The [`Engine`] trait captures exactly the surface consumed from the
//! wrapped library; see its docs for the contract an engine implementation
//! must honor.
//!
//! ```no_run
//! # use mqtt_bridge::{AsyncClient, ConnectOptions, Engine, Message, QoS};
//! # async fn example<E: Engine>(engine: E) -> Result<(), E::Error> {
//! let client = AsyncClient::new(engine).expect("no tokio runtime");
//!
//! client.set_on_message(Some(Box::new(|_client, message| {
//!     println!("{}: {} bytes", message.topic, message.payload.len());
//! })));
//!
//! client.loop_start()?;
//! client.connect(ConnectOptions::new("broker.local")).await?;
//! client.subscribe("sensors/#", QoS::AtLeastOnce)?;
//!
//! let token = client.publish(Message::new("status", b"online".to_vec()))?;
//! token.wait_for_publish().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod slot;
mod token;

pub use client::{
    AsyncClient, ConnectCallback, DisconnectCallback, LogCallback, MessageCallback,
    PublishCallback, SubscribeCallback, UnsubscribeCallback,
};
pub use engine::{
    ConnectOptions, DeliveryToken, Engine, EventSink, LogLevel, Message, MessageId, QoS,
    ReasonCode, TlsOptions,
};
pub use error::NoSchedulerError;
pub use token::PublishToken;
