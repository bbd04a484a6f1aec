//! Transaction lifecycle notification.
//!
//! [`ListenerBus`] decorates a connection's raw transaction primitives with
//! listener hooks, instead of patching the primitives themselves. Listeners
//! opt into hooks by overriding the default no-op methods.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::store::TransactionControl;

/// A transaction lifecycle listener.
///
/// Every hook defaults to a no-op; implement only the phases you care
/// about. Hooks run synchronously on the flushing task and should be cheap.
pub trait TransactionListener: Send + Sync {
    /// Runs before the transaction commits. An error here aborts the
    /// commit.
    fn before_commit(&self) -> Result<()> {
        Ok(())
    }

    /// Runs after the transaction committed.
    fn after_commit(&self) -> Result<()> {
        Ok(())
    }

    /// Runs after the transaction rolled back.
    fn after_rollback(&self) -> Result<()> {
        Ok(())
    }

    /// Runs after a rollback to a savepoint.
    fn after_rollback_to_savepoint(&self) -> Result<()> {
        Ok(())
    }

    /// Runs before a savepoint is created. An error here aborts the
    /// savepoint.
    fn before_create_savepoint(&self) -> Result<()> {
        Ok(())
    }
}

/// Wraps a [`TransactionControl`] with listener notification.
///
/// Listeners run in registration order. Within one phase every listener
/// runs even when an earlier one failed; the first error propagates after
/// the phase completes. An error in an after phase cannot undo the store
/// operation that already executed.
pub struct ListenerBus<C> {
    inner: C,
    listeners: Vec<Arc<dyn TransactionListener>>,
}

impl<C> ListenerBus<C> {
    /// Wraps a connection.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener. Invocation order is registration order.
    pub fn register(&mut self, listener: Arc<dyn TransactionListener>) {
        self.listeners.push(listener);
    }

    /// The wrapped connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The wrapped connection, mutably.
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Unwraps the bus, dropping the listeners.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Runs one hook across all listeners, best effort.
    fn notify(&self, phase: &str, hook: impl Fn(&dyn TransactionListener) -> Result<()>) -> Result<()> {
        let mut first_error = None;
        for listener in &self.listeners {
            if let Err(error) = hook(listener.as_ref()) {
                warn!(phase, %error, "transaction listener failed");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<C: TransactionControl + Send> TransactionControl for ListenerBus<C> {
    async fn commit(&mut self) -> Result<()> {
        self.notify("before_commit", |l| l.before_commit())?;
        self.inner.commit().await?;
        self.notify("after_commit", |l| l.after_commit())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await?;
        self.notify("after_rollback", |l| l.after_rollback())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.inner.rollback_to_savepoint(name).await?;
        self.notify("after_rollback_to_savepoint", |l| l.after_rollback_to_savepoint())
    }

    async fn create_savepoint(&mut self, name: &str) -> Result<()> {
        self.notify("before_create_savepoint", |l| l.before_create_savepoint())?;
        self.inner.create_savepoint(name).await
    }
}
