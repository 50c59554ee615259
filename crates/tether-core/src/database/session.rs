use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use rusqlite::types::{FromSql, Value, ValueRef};

use crate::database::{SQL_ECHO_TARGET, storage_error, storage_error_text};
use crate::models::{CoreError, CoreErrorKind, CoreResult, SessionId, SessionState};

/// Handle to one unit of work against the database.
///
/// Clones share the same connection and transaction. The first statement
/// opens a transaction; nothing is committed until [`DbSession::commit`].
#[derive(Clone)]
pub struct DbSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    echo: bool,
    slot: Mutex<SessionSlot>,
}

struct SessionSlot {
    connection: Option<Connection>,
    state: SessionState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DbSession {
    pub(crate) fn new(id: SessionId, connection: Connection, echo: bool) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                echo,
                slot: Mutex::new(SessionSlot {
                    connection: Some(connection),
                    state: SessionState::Idle,
                }),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> CoreResult<SessionState> {
        Ok(self.inner.lock_slot()?.state)
    }

    /// True when both handles refer to the same underlying session.
    pub fn same_session(&self, other: &DbSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn execute(&self, sql: impl Into<String>) -> CoreResult<QueryResult> {
        let sql = sql.into();
        self.run_blocking("execute", move |inner| inner.execute(&sql))
            .await
    }

    pub async fn commit(&self) -> CoreResult<()> {
        self.run_blocking("commit", |inner| inner.finish_transaction("COMMIT"))
            .await
    }

    pub async fn rollback(&self) -> CoreResult<()> {
        self.run_blocking("rollback", |inner| inner.finish_transaction("ROLLBACK"))
            .await
    }

    /// Rolls back any open transaction and releases the connection.
    /// Closing an already closed session is a no-op.
    pub async fn close(&self) -> CoreResult<()> {
        self.run_blocking("close", SessionInner::close).await
    }

    pub(crate) fn close_blocking(&self) -> CoreResult<()> {
        self.inner.close()
    }

    async fn run_blocking<T, F>(&self, operation_name: &'static str, operation: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SessionInner) -> CoreResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || operation(&inner))
            .await
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("session '{operation_name}' task failed: {error}"),
                )
            })?
    }
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.slot.lock().ok().map(|slot| slot.state);
        f.debug_struct("DbSession")
            .field("id", &self.inner.id)
            .field("state", &state)
            .finish()
    }
}

impl SessionInner {
    fn lock_slot(&self) -> CoreResult<MutexGuard<'_, SessionSlot>> {
        self.slot.lock().map_err(|_| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("{} mutex poisoned", self.id),
            )
        })
    }

    fn echo(&self, sql: &str) {
        if self.echo {
            tracing::info!(target: SQL_ECHO_TARGET, session = %self.id, "{sql}");
        }
    }

    fn execute(&self, sql: &str) -> CoreResult<QueryResult> {
        let mut slot = self.lock_slot()?;
        let SessionSlot { connection, state } = &mut *slot;
        let connection = connection.as_ref().ok_or_else(|| self.closed_error())?;

        if *state == SessionState::Idle {
            self.echo("BEGIN");
            connection
                .execute_batch("BEGIN")
                .map_err(|error| storage_error("begin", error))?;
            *state = SessionState::InTransaction;
        }

        self.echo(sql);
        read_rows(connection, sql).map_err(|error| storage_error("execute", error))
    }

    fn finish_transaction(&self, statement: &str) -> CoreResult<()> {
        let mut slot = self.lock_slot()?;
        let SessionSlot { connection, state } = &mut *slot;
        let connection = connection.as_ref().ok_or_else(|| self.closed_error())?;

        if *state == SessionState::InTransaction {
            self.echo(statement);
            // SQLite ends the transaction even when COMMIT reports an error.
            *state = SessionState::Idle;
            connection
                .execute_batch(statement)
                .map_err(|error| storage_error(&statement.to_ascii_lowercase(), error))?;
        }

        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        let mut slot = self.lock_slot()?;
        let Some(connection) = slot.connection.take() else {
            return Ok(());
        };
        let was_open = slot.state == SessionState::InTransaction;
        slot.state = SessionState::Closed;

        if was_open {
            self.echo("ROLLBACK");
            connection
                .execute_batch("ROLLBACK")
                .map_err(|error| storage_error("rollback", error))?;
        }

        connection
            .close()
            .map_err(|(_, error)| storage_error("close", error))
    }

    fn closed_error(&self) -> CoreError {
        CoreError::new(
            CoreErrorKind::SessionClosed,
            format!("{} is closed", self.id),
        )
    }
}

fn read_rows(connection: &Connection, sql: &str) -> rusqlite::Result<QueryResult> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let column_count = columns.len();

    let rows = statement
        .query_map([], |row| {
            (0..column_count)
                .map(|index| row.get::<_, Value>(index))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(QueryResult { columns, rows })
}

impl QueryResult {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the only row. Zero rows or more than one row is an error.
    pub fn scalar_one<T: FromSql>(&self) -> CoreResult<T> {
        match self.rows.as_slice() {
            [] => Err(CoreError::new(
                CoreErrorKind::NoResultFound,
                "no row was found when one was required",
            )),
            [row] => first_column(row),
            _ => Err(CoreError::new(
                CoreErrorKind::MultipleResultsFound,
                format!(
                    "{} rows were found when exactly one was required",
                    self.rows.len()
                ),
            )),
        }
    }

    pub fn scalar_one_or_none<T: FromSql>(&self) -> CoreResult<Option<T>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        self.scalar_one().map(Some)
    }
}

fn first_column<T: FromSql>(row: &[Value]) -> CoreResult<T> {
    let value = row
        .first()
        .ok_or_else(|| storage_error_text("scalar_one", "row has no columns"))?;
    T::column_result(ValueRef::from(value))
        .map_err(|error| storage_error_text("scalar_one", error.to_string()))
}
