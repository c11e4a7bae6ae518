//! Per-account connection pool.
//!
//! The pool bounds the number of live sessions with a semaphore, keeps
//! released sessions for reuse until they have been idle for
//! `idle_timeout`, and retries transient connection failures with
//! exponential backoff. Authentication failures are returned immediately.
//! A reused session must answer NOOP first; one that does not is replaced
//! by a fresh connection.

mod backoff;

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

pub use backoff::Backoff;

use crate::account::{AccountConfig, SyncSettings};
use crate::error::{Error, Result};
use crate::remote::{Connector, RemoteSession};

struct IdleSession<S> {
    session: S,
    since: Instant,
}

type IdleList<S> = Arc<Mutex<Vec<IdleSession<S>>>>;

fn lock_idle<S>(idle: &Mutex<Vec<IdleSession<S>>>) -> MutexGuard<'_, Vec<IdleSession<S>>> {
    idle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A bounded pool of authenticated sessions for one account.
pub struct ConnectionPool<C: Connector> {
    connector: Arc<C>,
    account: AccountConfig,
    settings: SyncSettings,
    permits: Arc<Semaphore>,
    idle: IdleList<C::Session>,
    size: usize,
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("account", &self.account.id)
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates a pool sized by the account's pool-size override or the
    /// settings default.
    #[must_use]
    pub fn new(connector: Arc<C>, account: AccountConfig, settings: SyncSettings) -> Self {
        let size = account.pool_size(&settings);
        Self {
            connector,
            account,
            settings,
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::new())),
            size,
        }
    }

    /// Maximum number of concurrent sessions.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The account this pool connects to.
    #[must_use]
    pub const fn account(&self) -> &AccountConfig {
        &self.account
    }

    /// Number of sessions waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        lock_idle(&self.idle).len()
    }

    /// Borrows a session, waiting for a free slot if the pool is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server rejects the credentials, or
    /// [`Error::ConnectionUnavailable`] once every retry has failed.
    pub async fn acquire(&self) -> Result<PooledSession<C::Session>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionUnavailable {
                attempts: 0,
                last_error: "connection pool closed".to_string(),
            })?;

        let session = match self.take_idle().await {
            Some(session) => session,
            None => self.connect_with_retry().await?,
        };

        Ok(PooledSession {
            session: Some(session),
            idle: Arc::clone(&self.idle),
            poisoned: false,
            _permit: permit,
        })
    }

    /// Opens a fresh session outside the pool, with the same retry policy.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionPool::acquire`].
    pub async fn connect_unpooled(&self) -> Result<C::Session> {
        self.connect_with_retry().await
    }

    /// Logs out every idle session.
    pub async fn close_idle(&self) {
        let sessions: Vec<_> = lock_idle(&self.idle).drain(..).collect();
        for idle in sessions {
            if let Err(e) = idle.session.logout().await {
                tracing::debug!(account = %self.account.id, error = %e, "logout failed");
            }
        }
    }

    /// Pops the freshest idle session that still answers NOOP. Sessions
    /// past `idle_timeout` are logged out and dead ones dropped.
    async fn take_idle(&self) -> Option<C::Session> {
        loop {
            let (expired, candidate) = {
                let mut idle = lock_idle(&self.idle);
                let now = Instant::now();
                let timeout = self.settings.idle_timeout;
                let (fresh, expired): (Vec<_>, Vec<_>) = idle
                    .drain(..)
                    .partition(|entry| now.duration_since(entry.since) < timeout);
                *idle = fresh;
                (expired, idle.pop())
            };

            if !expired.is_empty() {
                tracing::debug!(
                    account = %self.account.id,
                    retired = expired.len(),
                    "retiring idle sessions"
                );
                for entry in expired {
                    if let Err(e) = entry.session.logout().await {
                        tracing::debug!(account = %self.account.id, error = %e, "logout failed");
                    }
                }
            }

            let mut entry = candidate?;
            match entry.session.noop().await {
                Ok(()) => return Some(entry.session),
                Err(e) => {
                    tracing::debug!(account = %self.account.id, error = %e, "idle session is dead");
                }
            }
        }
    }

    async fn connect_with_retry(&self) -> Result<C::Session> {
        let backoff = Backoff::new(self.settings.backoff_base, self.settings.backoff_max);
        let max_attempts = self.settings.max_connect_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.connector.connect(&self.account, &self.settings).await {
                Ok(session) => {
                    tracing::debug!(account = %self.account.id, attempt, "session opened");
                    return Ok(session);
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::warn!(account = %self.account.id, error = %err, "connection failed");
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    account = %self.account.id,
                    attempts = attempt,
                    error = %err,
                    "giving up on connection"
                );
                return Err(Error::ConnectionUnavailable {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = backoff.delay(attempt);
            tracing::warn!(
                account = %self.account.id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "connection attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A session borrowed from a [`ConnectionPool`].
///
/// Dropping the guard returns the session to the pool unless it was
/// poisoned, in which case the connection is closed.
pub struct PooledSession<S: RemoteSession> {
    session: Option<S>,
    idle: IdleList<S>,
    poisoned: bool,
    _permit: OwnedSemaphorePermit,
}

impl<S: RemoteSession> std::fmt::Debug for PooledSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S: RemoteSession> PooledSession<S> {
    /// Marks the session unusable; it will be closed instead of reused.
    pub const fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Returns true if the session will be discarded on release.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Passes `result` through, poisoning the session if the error means
    /// the connection state is no longer known.
    ///
    /// # Errors
    ///
    /// Returns `result`'s error unchanged.
    pub fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.poisons_session()
        {
            tracing::debug!(error = %err, "poisoning pooled session");
            self.poisoned = true;
        }
        result
    }
}

impl<S: RemoteSession> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        match &self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<S: RemoteSession> DerefMut for PooledSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<S: RemoteSession> Drop for PooledSession<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.poisoned {
            tracing::debug!("discarding poisoned session");
            return;
        }
        lock_idle(&self.idle).push(IdleSession {
            session,
            since: Instant::now(),
        });
    }
}
