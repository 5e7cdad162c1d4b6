//! Stream session data model and persistence.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteSessionStore;
pub use store::{NewSession, SessionFilter, SessionStore, StoreError};
pub use types::{SessionStatus, StreamSession, TransitionOutcome, TransitionUpdate};
