use std::fmt::{Display, Formatter};

/// Identity of the logical task a registry entry belongs to.
///
/// `Runtime` keys come from the tokio task currently being polled. `Pinned`
/// keys are chosen by the caller through `task_context::with_task_key` and
/// stay the same across every task that inherits the scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskKey {
    Runtime(tokio::task::Id),
    Pinned(u64),
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Runtime(id) => write!(f, "task:{id}"),
            Self::Pinned(value) => write!(f, "pinned:{value}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionState {
    Idle,
    InTransaction,
    Closed,
}
