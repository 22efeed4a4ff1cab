use chrono::NaiveDateTime;
use diesel::dsl::not;
use diesel::prelude::*;
use uuid::Uuid;

use super::{AccountRepository, StoreError, StoreResult, TodoRepository};
use crate::db::{PgPool, PooledConn};
use crate::models::{Identity, NewSession, NewTodo, NewUser, Session, Todo, TodoChanges, User};
use crate::schema::{sessions, todos, users};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    fn conn(&self) -> StoreResult<PooledConn> {
        Ok(self.pool.get()?)
    }
}

impl TodoRepository for PgStore {
    fn insert(&self, new_todo: NewTodo) -> StoreResult<Todo> {
        let mut conn = self.conn()?;
        let todo = diesel::insert_into(todos::table)
            .values(&new_todo)
            .returning(Todo::as_returning())
            .get_result(&mut conn)?;
        Ok(todo)
    }

    fn find_owned(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Todo>> {
        let mut conn = self.conn()?;
        let todo = todos::table
            .filter(todos::id.eq(id).and(todos::user_id.eq(owner)))
            .select(Todo::as_select())
            .first::<Todo>(&mut conn)
            .optional()?;
        Ok(todo)
    }

    fn list_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Todo>> {
        let mut conn = self.conn()?;
        let items = todos::table
            .filter(todos::user_id.eq(owner))
            .order(todos::created_at.desc())
            .select(Todo::as_select())
            .load::<Todo>(&mut conn)?;
        Ok(items)
    }

    fn update(&self, id: Uuid, changes: &TodoChanges) -> StoreResult<Todo> {
        let mut conn = self.conn()?;
        diesel::update(todos::table.find(id))
            .set(changes)
            .returning(Todo::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or(StoreError::Missing(id))
    }

    fn toggle_completed(&self, id: Uuid, now: NaiveDateTime) -> StoreResult<Todo> {
        let mut conn = self.conn()?;
        diesel::update(todos::table.find(id))
            .set((
                todos::completed.eq(not(todos::completed)),
                todos::updated_at.eq(now),
            ))
            .returning(Todo::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or(StoreError::Missing(id))
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let removed = diesel::delete(todos::table.find(id)).execute(&mut conn)?;
        if removed == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }
}

impl AccountRepository for PgStore {
    fn upsert_user(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let user = diesel::insert_into(users::table)
            .values(new_user)
            .on_conflict(users::email)
            .do_update()
            .set((
                users::name.eq(&new_user.name),
                users::image.eq(&new_user.image),
                users::updated_at.eq(diesel::dsl::now),
            ))
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        Ok(user)
    }

    fn create_session(&self, new_session: &NewSession) -> StoreResult<Session> {
        let mut conn = self.conn()?;
        let session = diesel::insert_into(sessions::table)
            .values(new_session)
            .returning(Session::as_returning())
            .get_result(&mut conn)?;
        Ok(session)
    }

    fn find_identity(&self, token: Uuid, now: NaiveDateTime) -> StoreResult<Option<Identity>> {
        let mut conn = self.conn()?;
        let found = sessions::table
            .inner_join(users::table)
            .filter(sessions::id.eq(token))
            .filter(sessions::expires_at.gt(now))
            .select((users::id, users::email))
            .first::<(Uuid, String)>(&mut conn)
            .optional()?;
        Ok(found.map(|(user_id, email)| Identity { user_id, email }))
    }

    fn delete_session(&self, token: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::delete(sessions::table.find(token)).execute(&mut conn)?;
        Ok(())
    }

    fn purge_expired_sessions(&self, now: NaiveDateTime) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let removed = diesel::delete(sessions::table.filter(sessions::expires_at.le(now)))
            .execute(&mut conn)?;
        Ok(removed)
    }
}
