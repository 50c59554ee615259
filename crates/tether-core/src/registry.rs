use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::database::DbSession;
use crate::models::{CoreError, CoreErrorKind, CoreResult, TaskKey};
use crate::task_context::require_current_task_key;

static GLOBAL_REGISTRY: OnceLock<SessionRegistry> = OnceLock::new();

/// Mapping from task identity to the session that task is working with.
///
/// Entries are written and removed by request code; the registry never
/// creates, evicts or closes sessions on its own.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<TaskKey, DbSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by everything in this process.
    pub fn global() -> &'static SessionRegistry {
        GLOBAL_REGISTRY.get_or_init(SessionRegistry::new)
    }

    /// Inserts `session` under `key`, returning the session it displaced.
    pub fn put(&self, key: TaskKey, session: DbSession) -> CoreResult<Option<DbSession>> {
        let previous = self.lock_entries()?.insert(key, session);
        if previous.is_some() {
            tracing::warn!(task = %key, "overwrote existing registry entry");
        }
        Ok(previous)
    }

    pub fn remove(&self, key: TaskKey) -> CoreResult<Option<DbSession>> {
        Ok(self.lock_entries()?.remove(&key))
    }

    pub fn get(&self, key: TaskKey) -> CoreResult<Option<DbSession>> {
        Ok(self.lock_entries()?.get(&key).cloned())
    }

    pub fn contains(&self, key: TaskKey) -> CoreResult<bool> {
        Ok(self.lock_entries()?.contains_key(&key))
    }

    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.lock_entries()?.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.lock_entries()?.is_empty())
    }

    pub fn keys(&self) -> CoreResult<Vec<TaskKey>> {
        Ok(self.lock_entries()?.keys().copied().collect())
    }

    pub fn lookup(&self, key: TaskKey) -> CoreResult<DbSession> {
        self.get(key)?
            .ok_or_else(|| CoreError::session_not_found(key))
    }

    /// Session registered under the caller's task identity.
    pub fn current(&self) -> CoreResult<DbSession> {
        self.lookup(require_current_task_key()?)
    }

    /// Registers `session` for the current task until the guard is dropped.
    pub fn register_current(&self, session: DbSession) -> CoreResult<RegistrationGuard<'_>> {
        let key = require_current_task_key()?;
        self.put(key, session.clone())?;
        Ok(RegistrationGuard {
            registry: self,
            key,
            session,
        })
    }

    fn lock_entries(&self) -> CoreResult<MutexGuard<'_, HashMap<TaskKey, DbSession>>> {
        self.entries.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "session registry mutex poisoned")
        })
    }
}

/// Removes its registry entry on drop, on success and error paths alike.
///
/// An entry that was overwritten by someone else in the meantime is left in
/// place.
#[must_use = "the entry is removed as soon as the guard is dropped"]
pub struct RegistrationGuard<'a> {
    registry: &'a SessionRegistry,
    key: TaskKey,
    session: DbSession,
}

impl RegistrationGuard<'_> {
    pub fn key(&self) -> TaskKey {
        self.key
    }

    pub fn session(&self) -> &DbSession {
        &self.session
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        let Ok(mut entries) = self.registry.entries.lock() else {
            return;
        };
        if entries
            .get(&self.key)
            .is_some_and(|current| current.same_session(&self.session))
        {
            entries.remove(&self.key);
        }
    }
}

/// Runs `operation` with the session registered for the current task.
///
/// This is only a view onto the registry entry: the session is neither
/// committed nor closed when `operation` returns, so later callers in the
/// same task keep using it.
pub async fn with_current_session<F, Fut, T>(
    registry: &SessionRegistry,
    operation: F,
) -> CoreResult<T>
where
    F: FnOnce(DbSession) -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let session = registry.current()?;
    operation(session).await
}
