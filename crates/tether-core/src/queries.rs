use crate::database::DbSession;
use crate::models::CoreResult;

pub const FIRST_DATA_SQL: &str = "SELECT 1";
pub const SECOND_DATA_SQL: &str = "SELECT 2";

pub async fn first_data(session: &DbSession) -> CoreResult<i64> {
    session.execute(FIRST_DATA_SQL).await?.scalar_one()
}

pub async fn second_data(session: &DbSession) -> CoreResult<i64> {
    session.execute(SECOND_DATA_SQL).await?.scalar_one()
}

/// Same queries, resolving the session from the registry entry of the
/// current task instead of taking it as an argument.
pub mod ambient {
    use crate::models::CoreResult;
    use crate::registry::{SessionRegistry, with_current_session};

    pub async fn first_data(registry: &SessionRegistry) -> CoreResult<i64> {
        with_current_session(registry, |session| async move {
            super::first_data(&session).await
        })
        .await
    }

    pub async fn second_data(registry: &SessionRegistry) -> CoreResult<i64> {
        with_current_session(registry, |session| async move {
            super::second_data(&session).await
        })
        .await
    }
}
