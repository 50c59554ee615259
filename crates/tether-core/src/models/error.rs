use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::TaskKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    SessionNotFound,
    InvalidInput,
    NoCurrentTask,
    SessionClosed,
    NoResultFound,
    MultipleResultsFound,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub task: Option<TaskKey>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_task(mut self, task: TaskKey) -> Self {
        self.task = Some(task);
        self
    }

    pub fn session_not_found(task: TaskKey) -> Self {
        Self::new(CoreErrorKind::SessionNotFound, "session not found").with_task(task)
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.task {
            Some(task) => write!(f, "{:?} [{task}]: {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
