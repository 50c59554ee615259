use std::future::Future;

use crate::database::{DbSession, SessionFactory};
use crate::models::CoreResult;

/// Owns a session for the duration of one unit of work.
///
/// The session is committed and closed only through [`SessionScope::commit`].
/// Any other way out (an early `?`, a panic, the owning future being dropped)
/// rolls the transaction back and closes the connection in `Drop`.
pub struct SessionScope {
    session: DbSession,
    finished: bool,
}

impl SessionScope {
    pub fn begin(factory: &SessionFactory) -> CoreResult<Self> {
        Ok(Self {
            session: factory.create()?,
            finished: false,
        })
    }

    pub fn session(&self) -> &DbSession {
        &self.session
    }

    pub async fn commit(mut self) -> CoreResult<()> {
        self.session.commit().await?;
        self.session.close().await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> CoreResult<()> {
        self.session.close().await?;
        self.finished = true;
        Ok(())
    }

    /// Runs `operation` in a fresh scope, committing on `Ok` and rolling back
    /// on `Err`.
    pub async fn run<F, Fut, T>(factory: &SessionFactory, operation: F) -> CoreResult<T>
    where
        F: FnOnce(DbSession) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let scope = Self::begin(factory)?;
        match operation(scope.session.clone()).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = scope.rollback().await {
                    tracing::warn!(error = %rollback_error, "rollback after failed operation also failed");
                }
                Err(error)
            }
        }
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!(session = %self.session.id(), "session scope left without commit, rolling back");
        if let Err(error) = self.session.close_blocking() {
            tracing::warn!(session = %self.session.id(), %error, "failed to close abandoned session");
        }
    }
}
