//! Shared backend connection and transaction scopes.
//!
//! A [`Connection`] owns one relational backend behind a mutex. Writers
//! take a [`Transaction`], which holds the lock for its whole lifetime, so
//! at most one multi-table write is in flight per connection. Transactions
//! nest: [`Transaction::nested`] opens an inner scope on the same backend,
//! and only the outermost commit publishes.

use crate::error::CoreResult;
use entirel_storage::{InMemoryBackend, RelationalBackend};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A cloneable handle to one relational backend.
#[derive(Clone)]
pub struct Connection {
    backend: Arc<Mutex<Box<dyn RelationalBackend>>>,
    generation: Arc<AtomicU64>,
}

impl Connection {
    /// Wraps a backend.
    pub fn new(backend: impl RelationalBackend + 'static) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Box::new(backend))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A connection to a fresh in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryBackend::new())
    }

    /// Opens a transaction, blocking until the backend is free.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a scope.
    pub fn begin(&self) -> CoreResult<Transaction<'_>> {
        let mut guard = self.backend.lock();
        guard.begin()?;
        Ok(Transaction {
            guard,
            finished: false,
        })
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the function's error, or the backend's error on begin or
    /// commit.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        let mut txn = self.begin()?;
        match f(&mut txn) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(e) => {
                // Try to roll back, but don't mask the original error
                let _ = txn.rollback();
                Err(e)
            }
        }
    }

    /// Counter of cache invalidations issued by writers on this connection.
    ///
    /// A reader that fills a cache compares the value taken before its read
    /// with the value after the fill, and drops what it stored if they
    /// differ.
    #[must_use]
    pub fn write_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Advances the write generation. Must happen before the matching
    /// cache invalidation.
    pub(crate) fn bump_write_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs a read-only function against the backend outside a transaction.
    pub fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&dyn RelationalBackend) -> T,
    {
        let guard = self.backend.lock();
        f(&**guard)
    }

    /// Runs a function with exclusive access to the backend, outside a
    /// transaction.
    pub fn with_backend<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut dyn RelationalBackend) -> T,
    {
        let mut guard = self.backend.lock();
        f(&mut **guard)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("strong_count", &Arc::strong_count(&self.backend))
            .finish_non_exhaustive()
    }
}

/// An open transaction scope.
///
/// Dropping a transaction that was neither committed nor rolled back rolls
/// it back.
pub struct Transaction<'a> {
    guard: MutexGuard<'a, Box<dyn RelationalBackend>>,
    finished: bool,
}

impl Transaction<'_> {
    /// The backend, for reads and writes inside the scope.
    pub fn backend(&mut self) -> &mut dyn RelationalBackend {
        &mut **self.guard
    }

    /// Read-only view of the backend.
    #[must_use]
    pub fn reader(&self) -> &dyn RelationalBackend {
        &**self.guard
    }

    /// Nesting depth of the backend's transaction scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.guard.transaction_depth()
    }

    /// Runs `f` in an inner scope.
    ///
    /// The inner scope is folded into this one on success and rolled back
    /// on failure; the outer scope still decides the final outcome.
    ///
    /// # Errors
    ///
    /// Returns the function's error or the backend's scope error.
    pub fn nested<F, T>(&mut self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        self.guard.begin()?;
        match f(self) {
            Ok(result) => {
                self.guard.commit()?;
                Ok(result)
            }
            Err(e) => {
                let _ = self.guard.rollback();
                Err(e)
            }
        }
    }

    /// Commits the scope.
    ///
    /// # Errors
    ///
    /// Returns the backend's error; the scope is then rolled back on drop.
    pub fn commit(mut self) -> CoreResult<()> {
        self.guard.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Rolls the scope back.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finished = true;
        self.guard.rollback()?;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.guard.rollback();
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("depth", &self.depth())
            .field("finished", &self.finished)
            .finish()
    }
}
