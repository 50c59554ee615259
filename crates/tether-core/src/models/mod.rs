pub mod error;
pub mod session;

pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use session::{SessionId, SessionState, TaskKey};
