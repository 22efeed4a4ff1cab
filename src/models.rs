// todo_starter/src/models.rs
use crate::schema::{sessions, todos, users};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rocket::serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Queryable, Identifiable, Selectable, Serialize, Deserialize, Debug, PartialEq, Clone)]
#[diesel(table_name = users)]
#[serde(crate = "rocket::serde")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Row written on sign-in. On conflict with an existing email only `name` and
/// `image` are refreshed.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<NaiveDateTime>,
}

#[derive(Queryable, Identifiable, Selectable, Associations, Serialize, Deserialize, Debug, PartialEq, Clone)]
#[diesel(belongs_to(User))]
#[diesel(table_name = todos)]
#[serde(crate = "rocket::serde")]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = todos)]
pub struct NewTodo {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

// Used for creating a todo from a request (user_id comes from the session)
#[derive(Deserialize, Debug)]
#[serde(crate = "rocket::serde")]
pub struct CreateTodoRequest {
    pub title: String,
    pub description: Option<String>,
}

/// Partial update supplied by the caller. Absent fields are left untouched.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(crate = "rocket::serde")]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// Changeset applied to a stored todo. There is no owner column here, so no
/// update can move a todo to another user.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = todos)]
pub struct TodoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub updated_at: NaiveDateTime,
}

impl TodoChanges {
    pub fn from_patch(patch: TodoPatch, now: NaiveDateTime) -> Self {
        TodoChanges {
            title: patch.title,
            description: patch.description,
            completed: patch.completed,
            updated_at: now,
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub user_id: Uuid,
    pub expires_at: NaiveDateTime,
}

/// The authenticated principal a session resolves to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(crate = "rocket::serde")]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}
