//! Publish acknowledgement handle with a cooperative wait.

use std::ops::Deref;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::client::run_blocking;
use crate::engine::{DeliveryToken, MessageId};

/// Handle for one in-flight publish, returned by
/// [`AsyncClient::publish`](crate::AsyncClient::publish).
///
/// Wraps the engine's native acknowledgement token. The native read-only
/// surface stays reachable through `Deref`; the one addition is
/// [`wait_for_publish`](Self::wait_for_publish), which suspends the calling
/// task instead of blocking the thread the way the native wait does.
pub struct PublishToken<T: DeliveryToken> {
    token: Arc<T>,
    scheduler: Handle,
}

impl<T: DeliveryToken> PublishToken<T> {
    pub(crate) fn new(token: T, scheduler: Handle) -> Self {
        Self {
            token: Arc::new(token),
            scheduler,
        }
    }

    /// Packet identifier of the tracked publish.
    pub fn message_id(&self) -> MessageId {
        self.token.message_id()
    }

    /// Whether the publish has already been acknowledged.
    pub fn is_published(&self) -> bool {
        self.token.is_published()
    }

    /// Suspend until the engine acknowledges the publish, resuming with the
    /// engine's own completion value.
    ///
    /// The native blocking wait runs on a blocking worker; other tasks keep
    /// running meanwhile. Cancelling (dropping) this future leaves that
    /// worker running to completion in the background, since the engine has
    /// no way to interrupt the wait. A caller still suspended when the
    /// runtime shuts down panics, as no completion value can exist then.
    pub async fn wait_for_publish(&self) -> Result<(), T::Error> {
        let token = Arc::clone(&self.token);
        run_blocking(&self.scheduler, move || token.wait_for_publish()).await
    }
}

impl<T: DeliveryToken> Deref for PublishToken<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.token
    }
}

impl<T: DeliveryToken> Clone for PublishToken<T> {
    fn clone(&self) -> Self {
        Self {
            token: Arc::clone(&self.token),
            scheduler: self.scheduler.clone(),
        }
    }
}
