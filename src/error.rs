//! Bridge-owned error types.
//!
//! This is deliberately tiny: errors from the wrapped engine propagate to
//! callers as the engine's own error type, untranslated. The bridge only
//! owns the one failure mode it can introduce itself.

use thiserror::Error;

/// No tokio runtime was supplied and none could be discovered in the calling
/// context.
///
/// Returned by [`AsyncClient::new`](crate::AsyncClient::new) when called from
/// outside a runtime. Either construct the client from within a runtime, or
/// pass a handle explicitly via
/// [`AsyncClient::with_scheduler`](crate::AsyncClient::with_scheduler).
#[derive(Debug, Error)]
#[error("no tokio runtime available; construct inside a runtime or pass a Handle explicitly")]
pub struct NoSchedulerError;
