pub mod factory;
pub mod session;

pub use factory::{ScopedSessionFactory, SessionFactory};
pub use session::{DbSession, QueryResult};

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

pub const DEFAULT_DATABASE_NAME: &str = "tether";

/// Target used for statement echo, so it can be filtered on its own.
pub const SQL_ECHO_TARGET: &str = "tether::sql";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseConfig {
    pub name: String,
    pub echo: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATABASE_NAME.to_string(),
            echo: false,
        }
    }
}

/// Ephemeral in-memory SQLite database shared by every session opened from it.
///
/// Sessions connect to the same named shared-cache memory database. SQLite
/// drops such a database once its last connection closes, so an anchor
/// connection is held for as long as any clone of the `Database` is alive.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: DatabaseConfig,
    uri: String,
    _anchor: Mutex<Connection>,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> CoreResult<Self> {
        validate_name(&config.name)?;
        let uri = memory_uri(&config.name);
        let anchor = open_connection(&uri).map_err(|error| storage_error("open", error))?;

        tracing::debug!(database = %config.name, echo = config.echo, "opened in-memory database");

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                uri,
                _anchor: Mutex::new(anchor),
            }),
        })
    }

    pub fn in_memory() -> CoreResult<Self> {
        Self::open(DatabaseConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn echo(&self) -> bool {
        self.inner.config.echo
    }

    pub(crate) fn connect(&self) -> CoreResult<Connection> {
        open_connection(&self.inner.uri).map_err(|error| storage_error("connect", error))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.config.name)
            .field("echo", &self.inner.config.echo)
            .finish()
    }
}

fn open_connection(uri: &str) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        uri,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn memory_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            "database name must not be empty",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("database name '{name}' may only contain ASCII letters, digits, '-' and '_'"),
        ));
    }

    Ok(())
}

pub(crate) fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

pub(crate) fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite '{operation}' failed: {}", message.as_ref()),
    )
}
