use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::database::{Database, DbSession};
use crate::models::{CoreResult, SessionId};
use crate::registry::SessionRegistry;
use crate::task_context::require_current_task_key;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opens new sessions against one database.
#[derive(Clone, Debug)]
pub struct SessionFactory {
    database: Database,
}

impl SessionFactory {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn create(&self) -> CoreResult<DbSession> {
        let connection = self.database.connect()?;
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(session = %id, database = self.database.name(), "created session");
        Ok(DbSession::new(id, connection, self.database.echo()))
    }
}

/// Hands out one session per task identity, creating it on first use.
///
/// Sessions stay registered until [`ScopedSessionFactory::remove`] is called
/// from the same task; nothing removes them automatically.
#[derive(Clone, Debug)]
pub struct ScopedSessionFactory {
    factory: SessionFactory,
    registry: Arc<SessionRegistry>,
}

impl ScopedSessionFactory {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn get(&self) -> CoreResult<DbSession> {
        let key = require_current_task_key()?;
        if let Some(session) = self.registry.get(key)? {
            return Ok(session);
        }

        let session = self.factory.create()?;
        self.registry.put(key, session.clone())?;
        Ok(session)
    }

    /// Closes and forgets the current task's session, if it has one.
    pub async fn remove(&self) -> CoreResult<()> {
        let key = require_current_task_key()?;
        if let Some(session) = self.registry.remove(key)? {
            session.close().await?;
        }
        Ok(())
    }
}
