use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{CoreError, CoreErrorKind, CoreResult, TaskKey};

tokio::task_local! {
    static PINNED_TASK_KEY: u64;
}

static NEXT_PINNED_KEY: AtomicU64 = AtomicU64::new(1);

/// Key of the logical task currently being polled.
///
/// A pinned key set by [`with_task_key`] wins over the runtime task id. Code
/// running outside any tokio task (for example directly inside `block_on`)
/// has no identity and gets `None`.
pub fn current_task_key() -> Option<TaskKey> {
    if let Ok(pinned) = PINNED_TASK_KEY.try_with(|key| *key) {
        return Some(TaskKey::Pinned(pinned));
    }
    tokio::task::try_id().map(TaskKey::Runtime)
}

pub fn require_current_task_key() -> CoreResult<TaskKey> {
    current_task_key().ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::NoCurrentTask,
            "not running inside a runtime task",
        )
    })
}

/// Runs `future` with `key` as its task identity.
///
/// The key is scoped to `future` only: tasks spawned from inside it get their
/// own runtime identity again.
pub async fn with_task_key<F>(key: u64, future: F) -> F::Output
where
    F: Future,
{
    PINNED_TASK_KEY.scope(key, future).await
}

/// Like [`with_task_key`] with a fresh key that no other scope has used.
pub async fn with_new_task_key<F>(future: F) -> F::Output
where
    F: Future,
{
    let key = NEXT_PINNED_KEY.fetch_add(1, Ordering::Relaxed);
    with_task_key(key, future).await
}
