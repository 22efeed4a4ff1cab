//! Persistence behind the todo access layer and the session resolver.
//!
//! Both are written against the traits here so they can run on Postgres in
//! production and on an in-memory map in development and tests.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::{Identity, NewSession, NewTodo, NewUser, Session, Todo, TodoChanges, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("record {0} not found")]
    Missing(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait TodoRepository: Send + Sync {
    fn insert(&self, new_todo: NewTodo) -> StoreResult<Todo>;

    /// Looks a todo up by id, but only if `owner` owns it.
    fn find_owned(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Todo>>;

    /// All todos owned by `owner`, newest first.
    fn list_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Todo>>;

    fn update(&self, id: Uuid, changes: &TodoChanges) -> StoreResult<Todo>;

    /// Negates `completed` in place, in a single write.
    fn toggle_completed(&self, id: Uuid, now: NaiveDateTime) -> StoreResult<Todo>;

    fn delete(&self, id: Uuid) -> StoreResult<()>;
}

pub trait AccountRepository: Send + Sync {
    /// Inserts the user, or refreshes `name` and `image` when the email is
    /// already known.
    fn upsert_user(&self, new_user: &NewUser) -> StoreResult<User>;

    fn create_session(&self, new_session: &NewSession) -> StoreResult<Session>;

    /// Resolves a session token to its user, ignoring sessions that expired
    /// before `now`.
    fn find_identity(&self, token: Uuid, now: NaiveDateTime) -> StoreResult<Option<Identity>>;

    fn delete_session(&self, token: Uuid) -> StoreResult<()>;

    /// Returns how many sessions were removed.
    fn purge_expired_sessions(&self, now: NaiveDateTime) -> StoreResult<usize>;
}
