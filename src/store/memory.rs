use chrono::{NaiveDateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{AccountRepository, StoreError, StoreResult, TodoRepository};
use crate::models::{Identity, NewSession, NewTodo, NewUser, Session, Todo, TodoChanges, User};

/// In-process store used when no `DATABASE_URL` is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    todos: DashMap<Uuid, Todo>,
    users: DashMap<Uuid, User>,
    user_ids_by_email: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl TodoRepository for MemoryStore {
    fn insert(&self, new_todo: NewTodo) -> StoreResult<Todo> {
        let created_at = now();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: new_todo.user_id,
            title: new_todo.title,
            description: new_todo.description,
            completed: false,
            created_at,
            updated_at: created_at,
        };
        self.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    fn find_owned(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Todo>> {
        Ok(self
            .todos
            .get(&id)
            .filter(|entry| entry.user_id == owner)
            .map(|entry| entry.value().clone()))
    }

    fn list_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Todo>> {
        let mut items: Vec<Todo> = self
            .todos
            .iter()
            .filter(|entry| entry.value().user_id == owner)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    fn update(&self, id: Uuid, changes: &TodoChanges) -> StoreResult<Todo> {
        let mut item = self.todos.get_mut(&id).ok_or(StoreError::Missing(id))?;
        if let Some(title) = &changes.title {
            item.title = title.clone();
        }
        if let Some(description) = &changes.description {
            item.description = Some(description.clone());
        }
        if let Some(completed) = changes.completed {
            item.completed = completed;
        }
        item.updated_at = changes.updated_at;
        Ok(item.value().clone())
    }

    fn toggle_completed(&self, id: Uuid, now: NaiveDateTime) -> StoreResult<Todo> {
        // The shard write lock is held for the whole read-modify-write.
        let mut item = self.todos.get_mut(&id).ok_or(StoreError::Missing(id))?;
        item.completed = !item.completed;
        item.updated_at = now;
        Ok(item.value().clone())
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.todos
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::Missing(id))
    }
}

impl AccountRepository for MemoryStore {
    fn upsert_user(&self, new_user: &NewUser) -> StoreResult<User> {
        let timestamp = now();
        match self.user_ids_by_email.entry(new_user.email.clone()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let mut user = self.users.get_mut(&id).ok_or(StoreError::Missing(id))?;
                user.name = new_user.name.clone();
                user.image = new_user.image.clone();
                user.updated_at = timestamp;
                Ok(user.value().clone())
            }
            Entry::Vacant(entry) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: new_user.email.clone(),
                    name: new_user.name.clone(),
                    image: new_user.image.clone(),
                    email_verified: new_user.email_verified,
                    created_at: timestamp,
                    updated_at: timestamp,
                };
                self.users.insert(user.id, user.clone());
                entry.insert(user.id);
                Ok(user)
            }
        }
    }

    fn create_session(&self, new_session: &NewSession) -> StoreResult<Session> {
        if !self.users.contains_key(&new_session.user_id) {
            return Err(StoreError::Missing(new_session.user_id));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new_session.user_id,
            created_at: now(),
            expires_at: new_session.expires_at,
        };
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    fn find_identity(&self, token: Uuid, now: NaiveDateTime) -> StoreResult<Option<Identity>> {
        let user_id = match self.sessions.get(&token) {
            Some(session) if session.expires_at > now => session.user_id,
            _ => return Ok(None),
        };
        Ok(self.users.get(&user_id).map(|user| Identity {
            user_id: user.id,
            email: user.email.clone(),
        }))
    }

    fn delete_session(&self, token: Uuid) -> StoreResult<()> {
        self.sessions.remove(&token);
        Ok(())
    }

    fn purge_expired_sessions(&self, now: NaiveDateTime) -> StoreResult<usize> {
        let mut purged = 0;
        self.sessions.retain(|_, session| {
            let live = session.expires_at > now;
            if !live {
                purged += 1;
            }
            live
        });
        Ok(purged)
    }
}
