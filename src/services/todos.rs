//! The todo access layer.
//!
//! Every operation takes the caller's identity explicitly. Missing identity on
//! a mutation is raised as [`ServiceError::Unauthorized`]; everything else that
//! goes wrong (store errors, ownership mismatches, and a missing identity on
//! `list`) comes back as a result value with `success: false` and a fixed
//! message. Store error details are logged, never returned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::error::ServiceError;
use crate::cache::{ViewCache, ROOT_PATH};
use crate::models::{Identity, NewTodo, Todo, TodoChanges, TodoPatch};
use crate::store::TodoRepository;

pub const UNAUTHORIZED: &str = "Unauthorized";
pub const NOT_FOUND_OR_UNAUTHORIZED: &str = "Todo not found or unauthorized";
pub const CREATE_FAILED: &str = "Failed to create todo";
pub const FETCH_FAILED: &str = "Failed to fetch todos";
pub const UPDATE_FAILED: &str = "Failed to update todo";
pub const TOGGLE_FAILED: &str = "Failed to toggle todo";
pub const DELETE_FAILED: &str = "Failed to delete todo";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TodoResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo: Option<Todo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TodoResult {
    fn ok(todo: Todo) -> Self {
        TodoResult { success: true, todo: Some(todo), error: None }
    }

    fn failed(message: &str) -> Self {
        TodoResult { success: false, todo: None, error: Some(message.to_string()) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TodoListResult {
    pub success: bool,
    pub todos: Vec<Todo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TodoListResult {
    fn failed(message: &str) -> Self {
        TodoListResult { success: false, todos: Vec::new(), error: Some(message.to_string()) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeleteResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResult {
    fn failed(message: &str) -> Self {
        DeleteResult { success: false, error: Some(message.to_string()) }
    }
}

fn require(identity: Option<&Identity>) -> Result<&Identity, ServiceError> {
    identity.ok_or(ServiceError::Unauthorized)
}

fn render(result: &TodoListResult) -> Result<String, ServiceError> {
    serde_json::to_string(result)
        .map_err(|e| ServiceError::InternalError(format!("Failed to render todos: {e}")))
}

pub struct TodoService {
    repo: Arc<dyn TodoRepository>,
    views: Arc<ViewCache>,
}

impl TodoService {
    pub fn new(repo: Arc<dyn TodoRepository>, views: Arc<ViewCache>) -> Self {
        TodoService { repo, views }
    }

    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Creates a todo owned by the caller. The title is stored as given;
    /// rejecting blank titles is the caller's job.
    pub fn create(
        &self,
        identity: Option<&Identity>,
        title: &str,
        description: Option<&str>,
    ) -> Result<TodoResult, ServiceError> {
        let identity = require(identity)?;
        let new_todo = NewTodo {
            user_id: identity.user_id,
            title: title.to_string(),
            description: description.map(str::to_string),
        };

        match self.repo.insert(new_todo) {
            Ok(todo) => {
                info!(user_id = %identity.user_id, todo_id = %todo.id, "created todo");
                self.views.revalidate_path(identity.user_id, ROOT_PATH);
                Ok(TodoResult::ok(todo))
            }
            Err(e) => {
                error!(user_id = %identity.user_id, error = %e, "error creating todo");
                Ok(TodoResult::failed(CREATE_FAILED))
            }
        }
    }

    /// The caller's todos, newest first.
    pub fn list(&self, identity: Option<&Identity>) -> TodoListResult {
        let Some(identity) = identity else {
            return TodoListResult::failed(UNAUTHORIZED);
        };

        match self.repo.list_for_owner(identity.user_id) {
            Ok(todos) => TodoListResult { success: true, todos, error: None },
            Err(e) => {
                error!(user_id = %identity.user_id, error = %e, "error fetching todos");
                TodoListResult::failed(FETCH_FAILED)
            }
        }
    }

    /// [`TodoService::list`] rendered as JSON, served from the view cache when
    /// a fresh copy exists. Only successful lists are cached.
    pub fn list_view(&self, identity: Option<&Identity>) -> Result<String, ServiceError> {
        let Some(identity) = identity else {
            return render(&self.list(None));
        };

        if let Some(body) = self.views.get(identity.user_id, ROOT_PATH) {
            return Ok(body);
        }

        let generation = self.views.generation(identity.user_id);
        let result = self.list(Some(identity));
        let body = render(&result)?;
        if result.success {
            self.views.put(identity.user_id, ROOT_PATH, body.clone(), generation);
        }
        Ok(body)
    }

    pub fn update(
        &self,
        identity: Option<&Identity>,
        id: Uuid,
        patch: TodoPatch,
    ) -> Result<TodoResult, ServiceError> {
        let identity = require(identity)?;

        let outcome = self.repo.find_owned(id, identity.user_id).and_then(|existing| {
            if existing.is_none() {
                return Ok(None);
            }
            let changes = TodoChanges::from_patch(patch, Utc::now().naive_utc());
            self.repo.update(id, &changes).map(Some)
        });

        Ok(self.settle(identity, id, outcome, "updated todo", UPDATE_FAILED))
    }

    /// Flips the completion flag. Calling it twice restores the previous
    /// state.
    pub fn toggle_complete(
        &self,
        identity: Option<&Identity>,
        id: Uuid,
    ) -> Result<TodoResult, ServiceError> {
        let identity = require(identity)?;

        let outcome = self.repo.find_owned(id, identity.user_id).and_then(|existing| {
            if existing.is_none() {
                return Ok(None);
            }
            self.repo.toggle_completed(id, Utc::now().naive_utc()).map(Some)
        });

        Ok(self.settle(identity, id, outcome, "toggled todo", TOGGLE_FAILED))
    }

    pub fn delete(&self, identity: Option<&Identity>, id: Uuid) -> Result<DeleteResult, ServiceError> {
        let identity = require(identity)?;

        let outcome = self.repo.find_owned(id, identity.user_id).and_then(|existing| {
            if existing.is_none() {
                return Ok(None);
            }
            self.repo.delete(id).map(Some)
        });

        match outcome {
            Ok(Some(())) => {
                info!(user_id = %identity.user_id, todo_id = %id, "deleted todo");
                self.views.revalidate_path(identity.user_id, ROOT_PATH);
                Ok(DeleteResult { success: true, error: None })
            }
            Ok(None) => Ok(DeleteResult::failed(NOT_FOUND_OR_UNAUTHORIZED)),
            Err(e) => {
                error!(user_id = %identity.user_id, todo_id = %id, error = %e, "error deleting todo");
                Ok(DeleteResult::failed(DELETE_FAILED))
            }
        }
    }

    fn settle(
        &self,
        identity: &Identity,
        id: Uuid,
        outcome: Result<Option<Todo>, crate::store::StoreError>,
        action: &str,
        failure: &str,
    ) -> TodoResult {
        match outcome {
            Ok(Some(todo)) => {
                info!(user_id = %identity.user_id, todo_id = %id, "{action}");
                self.views.revalidate_path(identity.user_id, ROOT_PATH);
                TodoResult::ok(todo)
            }
            Ok(None) => TodoResult::failed(NOT_FOUND_OR_UNAUTHORIZED),
            Err(e) => {
                error!(user_id = %identity.user_id, todo_id = %id, error = %e, "{failure}");
                TodoResult::failed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use chrono::NaiveDateTime;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn identity() -> Identity {
        let user_id = Uuid::new_v4();
        Identity { user_id, email: format!("{user_id}@example.com") }
    }

    fn service() -> TodoService {
        TodoService::new(Arc::new(MemoryStore::new()), Arc::new(ViewCache::new()))
    }

    struct BrokenStore;

    impl TodoRepository for BrokenStore {
        fn insert(&self, _: NewTodo) -> StoreResult<Todo> {
            Err(StoreError::Query(diesel::result::Error::BrokenTransactionManager))
        }
        fn find_owned(&self, _: Uuid, _: Uuid) -> StoreResult<Option<Todo>> {
            Err(StoreError::Query(diesel::result::Error::BrokenTransactionManager))
        }
        fn list_for_owner(&self, _: Uuid) -> StoreResult<Vec<Todo>> {
            Err(StoreError::Query(diesel::result::Error::BrokenTransactionManager))
        }
        fn update(&self, id: Uuid, _: &TodoChanges) -> StoreResult<Todo> {
            Err(StoreError::Missing(id))
        }
        fn toggle_completed(&self, id: Uuid, _: NaiveDateTime) -> StoreResult<Todo> {
            Err(StoreError::Missing(id))
        }
        fn delete(&self, id: Uuid) -> StoreResult<()> {
            Err(StoreError::Missing(id))
        }
    }

    #[test]
    fn unauthenticated_list_is_a_soft_failure() {
        let result = service().list(None);
        assert_eq!(
            result,
            TodoListResult { success: false, todos: vec![], error: Some("Unauthorized".into()) }
        );
    }

    #[test]
    fn unauthenticated_mutations_are_raised() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(service.create(None, "x", None), Err(ServiceError::Unauthorized)));
        assert!(matches!(service.update(None, id, TodoPatch::default()), Err(ServiceError::Unauthorized)));
        assert!(matches!(service.toggle_complete(None, id), Err(ServiceError::Unauthorized)));
        assert!(matches!(service.delete(None, id), Err(ServiceError::Unauthorized)));
    }

    #[test]
    fn empty_list_for_new_user() {
        let result = service().list(Some(&identity()));
        assert_eq!(result, TodoListResult { success: true, todos: vec![], error: None });
    }

    #[test]
    fn create_then_toggle_then_foreign_delete() {
        let service = service();
        let owner = identity();
        let intruder = identity();

        let created = service.create(Some(&owner), "Buy milk", Some("2%")).unwrap();
        assert!(created.success);
        let todo = created.todo.unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.description.as_deref(), Some("2%"));
        assert!(!todo.completed);
        assert_eq!(todo.user_id, owner.user_id);

        let toggled = service.toggle_complete(Some(&owner), todo.id).unwrap();
        assert!(toggled.success);
        assert!(toggled.todo.unwrap().completed);

        let denied = service.delete(Some(&intruder), todo.id).unwrap();
        assert_eq!(denied, DeleteResult { success: false, error: Some(NOT_FOUND_OR_UNAUTHORIZED.into()) });

        let remaining = service.list(Some(&owner)).todos;
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].completed);
    }

    #[test]
    fn toggle_twice_restores_flag() {
        let service = service();
        let owner = identity();
        let todo = service.create(Some(&owner), "Walk dog", None).unwrap().todo.unwrap();

        service.toggle_complete(Some(&owner), todo.id).unwrap();
        let back = service.toggle_complete(Some(&owner), todo.id).unwrap().todo.unwrap();
        assert_eq!(back.completed, todo.completed);
    }

    #[test]
    fn foreign_update_and_toggle_change_nothing() {
        let service = service();
        let owner = identity();
        let intruder = identity();
        let todo = service.create(Some(&owner), "Private", None).unwrap().todo.unwrap();

        let patch = TodoPatch { title: Some("Hijacked".into()), ..TodoPatch::default() };
        let updated = service.update(Some(&intruder), todo.id, patch).unwrap();
        assert_eq!(updated, TodoResult::failed(NOT_FOUND_OR_UNAUTHORIZED));
        let toggled = service.toggle_complete(Some(&intruder), todo.id).unwrap();
        assert_eq!(toggled, TodoResult::failed(NOT_FOUND_OR_UNAUTHORIZED));

        let stored = &service.list(Some(&owner)).todos[0];
        assert_eq!(stored, &todo);
        assert!(service.list(Some(&intruder)).todos.is_empty());
    }

    #[test]
    fn missing_todo_collapses_into_same_failure() {
        let service = service();
        let owner = identity();
        let result = service.delete(Some(&owner), Uuid::new_v4()).unwrap();
        assert_eq!(result.error.as_deref(), Some(NOT_FOUND_OR_UNAUTHORIZED));
    }

    #[test]
    fn update_changes_only_supplied_fields_and_keeps_owner() {
        let service = service();
        let owner = identity();
        let todo = service.create(Some(&owner), "Draft", Some("notes")).unwrap().todo.unwrap();

        let patch = TodoPatch { completed: Some(true), ..TodoPatch::default() };
        let updated = service.update(Some(&owner), todo.id, patch).unwrap().todo.unwrap();

        assert_eq!(updated.title, "Draft");
        assert_eq!(updated.description.as_deref(), Some("notes"));
        assert!(updated.completed);
        assert_eq!(updated.user_id, owner.user_id);
        assert_eq!(updated.created_at, todo.created_at);
    }

    #[test]
    fn list_is_newest_first_and_scoped_to_owner() {
        let service = service();
        let owner = identity();
        let other = identity();
        for title in ["one", "two", "three"] {
            service.create(Some(&owner), title, None).unwrap();
        }
        service.create(Some(&other), "not mine", None).unwrap();

        let todos = service.list(Some(&owner)).todos;
        assert_eq!(todos.len(), 3);
        assert!(todos.iter().all(|t| t.user_id == owner.user_id));
        assert!(todos.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    }

    #[test]
    fn empty_title_is_not_rejected_here() {
        let service = service();
        let result = service.create(Some(&identity()), "", None).unwrap();
        assert!(result.success);
        assert_eq!(result.todo.unwrap().title, "");
    }

    #[test]
    fn successful_mutation_revalidates_root_views() {
        let service = service();
        let owner = identity();
        let views = service.views();
        assert!(views.put(owner.user_id, ROOT_PATH, "stale".into(), views.generation(owner.user_id)));

        service.create(Some(&owner), "Fresh", None).unwrap();
        assert!(service.views().get(owner.user_id, ROOT_PATH).is_none());
    }

    #[test]
    fn soft_failure_keeps_cached_views() {
        let service = service();
        let owner = identity();
        let views = service.views();
        assert!(views.put(owner.user_id, ROOT_PATH, "cached".into(), views.generation(owner.user_id)));

        service.delete(Some(&owner), Uuid::new_v4()).unwrap();
        assert!(service.views().get(owner.user_id, ROOT_PATH).is_some());
    }

    /// Lets a create land between the store read and the cache write of a
    /// list, the way a concurrent request would.
    struct CreateDuringList {
        inner: MemoryStore,
        views: Arc<ViewCache>,
        raced: AtomicBool,
    }

    impl TodoRepository for CreateDuringList {
        fn insert(&self, new_todo: NewTodo) -> StoreResult<Todo> {
            self.inner.insert(new_todo)
        }
        fn find_owned(&self, id: Uuid, owner: Uuid) -> StoreResult<Option<Todo>> {
            self.inner.find_owned(id, owner)
        }
        fn list_for_owner(&self, owner: Uuid) -> StoreResult<Vec<Todo>> {
            let snapshot = self.inner.list_for_owner(owner)?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.insert(NewTodo { user_id: owner, title: "late".into(), description: None })?;
                self.views.revalidate_path(owner, ROOT_PATH);
            }
            Ok(snapshot)
        }
        fn update(&self, id: Uuid, changes: &TodoChanges) -> StoreResult<Todo> {
            self.inner.update(id, changes)
        }
        fn toggle_completed(&self, id: Uuid, now: NaiveDateTime) -> StoreResult<Todo> {
            self.inner.toggle_completed(id, now)
        }
        fn delete(&self, id: Uuid) -> StoreResult<()> {
            self.inner.delete(id)
        }
    }

    fn list_view(service: &TodoService, owner: &Identity) -> TodoListResult {
        serde_json::from_str(&service.list_view(Some(owner)).unwrap()).unwrap()
    }

    #[test]
    fn list_view_is_cached_until_a_mutation() {
        let service = service();
        let owner = identity();

        assert!(list_view(&service, &owner).todos.is_empty());
        assert!(service.views().get(owner.user_id, ROOT_PATH).is_some());

        service.create(Some(&owner), "Fresh", None).unwrap();
        assert_eq!(list_view(&service, &owner).todos.len(), 1);
    }

    #[test]
    fn list_read_overtaken_by_a_create_is_not_cached() {
        let views = Arc::new(ViewCache::new());
        let repo = CreateDuringList {
            inner: MemoryStore::new(),
            views: views.clone(),
            raced: AtomicBool::new(false),
        };
        let service = TodoService::new(Arc::new(repo), views);
        let owner = identity();

        assert!(list_view(&service, &owner).todos.is_empty());
        assert!(service.views().get(owner.user_id, ROOT_PATH).is_none());
        assert_eq!(list_view(&service, &owner).todos.len(), 1);
    }

    #[test]
    fn unauthenticated_list_view_is_not_cached() {
        let service = service();
        let body: TodoListResult = serde_json::from_str(&service.list_view(None).unwrap()).unwrap();
        assert_eq!(body, TodoListResult::failed(UNAUTHORIZED));
    }

    #[test]
    fn failed_list_view_is_not_cached() {
        let service = TodoService::new(Arc::new(BrokenStore), Arc::new(ViewCache::new()));
        let owner = identity();
        assert_eq!(list_view(&service, &owner), TodoListResult::failed(FETCH_FAILED));
        assert!(service.views().get(owner.user_id, ROOT_PATH).is_none());
    }

    #[test]
    fn store_errors_become_fixed_messages() {
        let service = TodoService::new(Arc::new(BrokenStore), Arc::new(ViewCache::new()));
        let owner = identity();
        let id = Uuid::new_v4();

        assert_eq!(service.create(Some(&owner), "x", None).unwrap(), TodoResult::failed(CREATE_FAILED));
        assert_eq!(service.list(Some(&owner)), TodoListResult::failed(FETCH_FAILED));
        assert_eq!(
            service.update(Some(&owner), id, TodoPatch::default()).unwrap(),
            TodoResult::failed(UPDATE_FAILED)
        );
        assert_eq!(service.toggle_complete(Some(&owner), id).unwrap(), TodoResult::failed(TOGGLE_FAILED));
        assert_eq!(service.delete(Some(&owner), id).unwrap(), DeleteResult::failed(DELETE_FAILED));
    }

    #[test]
    fn result_shapes_serialize_without_absent_fields() {
        let body = serde_json::to_value(DeleteResult { success: true, error: None }).unwrap();
        assert_eq!(body, serde_json::json!({ "success": true }));

        let body = serde_json::to_value(TodoListResult::failed(UNAUTHORIZED)).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false, "error": "Unauthorized", "todos": [] }));
    }
}
