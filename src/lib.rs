use rocket::http::{Cookie, CookieJar, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::content::RawJson;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use rocket::fairing::AdHoc;
use rocket::{catch, catchers, delete, get, patch, post, routes, Responder, State};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub mod cache;
pub mod config;
pub mod db;
pub mod i18n;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;

use crate::cache::ROOT_PATH;
use crate::config::AppConfig;
use crate::i18n::{HomePageMessages, Language, Locale, RequestLocale, LOCALE_COOKIE};
use crate::models::{CreateTodoRequest, Identity, TodoPatch};
use crate::services::auth;
use crate::services::error::ServiceError;
use crate::services::todos::{DeleteResult, TodoResult, TodoService};
use crate::store::AccountRepository;

pub const SESSION_COOKIE: &str = "session_token";

pub struct TodoApp {
    pub todos: TodoService,
    pub accounts: Arc<dyn AccountRepository>,
    pub config: AppConfig,
}

// Serializable error body shared by every error response
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorDetail {
    pub error: String,
}

#[derive(Responder)]
pub enum ApiError {
    #[response(status = 401)]
    Unauthorized(Json<ErrorDetail>),
    #[response(status = 422)]
    InvalidInput(Json<ErrorDetail>),
    #[response(status = 500)]
    InternalError(Json<ErrorDetail>),
}

/// Session tokens the request presents: the `session_token` cookie first,
/// then a Bearer header.
pub struct SessionTokens(pub Vec<String>);

fn session_tokens(req: &Request<'_>) -> Vec<String> {
    let from_cookie = req
        .cookies()
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim().to_string());
    let from_header = req
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    from_cookie
        .into_iter()
        .chain(from_header)
        .filter(|token| !token.is_empty())
        .collect()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionTokens {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(SessionTokens(session_tokens(req)))
    }
}

/// The identity behind the request's session, if it has a live one. A stale
/// cookie does not hide a valid Bearer token.
pub struct AuthenticatedUser(pub Identity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(app) = req.rocket().state::<TodoApp>() else {
            return Outcome::Forward(Status::InternalServerError);
        };
        let identity = session_tokens(req)
            .iter()
            .find_map(|token| auth::resolve(app.accounts.as_ref(), token));
        match identity {
            Some(identity) => Outcome::Success(AuthenticatedUser(identity)),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

fn identity(user: &Option<AuthenticatedUser>) -> Option<&Identity> {
    user.as_ref().map(|user| &user.0)
}

#[post("/", data = "<create_req>")]
pub fn create_todo(
    app: &State<TodoApp>,
    user: Option<AuthenticatedUser>,
    create_req: Json<CreateTodoRequest>,
) -> Result<Json<TodoResult>, ApiError> {
    if create_req.title.trim().is_empty() {
        return Err(ServiceError::InvalidInput("Title must not be empty".to_string()).into());
    }
    let result = app.todos.create(
        identity(&user),
        &create_req.title,
        create_req.description.as_deref().filter(|d| !d.is_empty()),
    )?;
    Ok(Json(result))
}

/// Lists the caller's todos. Successful lists are served from the view cache
/// until a mutation revalidates it.
#[get("/")]
pub fn list_todos(app: &State<TodoApp>, user: Option<AuthenticatedUser>) -> Result<RawJson<String>, ApiError> {
    Ok(RawJson(app.todos.list_view(identity(&user))?))
}

#[patch("/<id>", data = "<patch>")]
pub fn update_todo(
    app: &State<TodoApp>,
    user: Option<AuthenticatedUser>,
    id: Uuid,
    patch: Json<TodoPatch>,
) -> Result<Json<TodoResult>, ApiError> {
    if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(ServiceError::InvalidInput("Title must not be empty".to_string()).into());
    }
    Ok(Json(app.todos.update(identity(&user), id, patch.into_inner())?))
}

#[post("/<id>/toggle")]
pub fn toggle_todo(
    app: &State<TodoApp>,
    user: Option<AuthenticatedUser>,
    id: Uuid,
) -> Result<Json<TodoResult>, ApiError> {
    Ok(Json(app.todos.toggle_complete(identity(&user), id)?))
}

#[delete("/<id>")]
pub fn delete_todo(
    app: &State<TodoApp>,
    user: Option<AuthenticatedUser>,
    id: Uuid,
) -> Result<Json<DeleteResult>, ApiError> {
    Ok(Json(app.todos.delete(identity(&user), id)?))
}

fn todo_routes() -> Vec<rocket::Route> {
    routes![create_todo, list_todos, update_todo, toggle_todo, delete_todo]
}

#[get("/session")]
pub fn current_session(user: Option<AuthenticatedUser>) -> Json<Option<Identity>> {
    Json(user.map(|user| user.0))
}

#[post("/logout")]
pub fn logout(app: &State<TodoApp>, cookies: &CookieJar<'_>, tokens: SessionTokens) -> Status {
    for token in &tokens.0 {
        if let Err(e) = auth::sign_out(app.accounts.as_ref(), token) {
            warn!(error = %e, "sign-out did not complete");
        }
    }
    cookies.remove(Cookie::from(SESSION_COOKIE));
    // Logging out always succeeds from the client's point of view.
    Status::NoContent
}

fn auth_routes() -> Vec<rocket::Route> {
    routes![current_session, logout]
}

#[derive(Serialize, Debug)]
pub struct HomePage {
    pub locale: Locale,
    pub messages: &'static HomePageMessages,
    pub languages: Vec<Language>,
    pub user: Option<Identity>,
}

#[get("/")]
pub fn index(locale: RequestLocale) -> Redirect {
    Redirect::to(format!("/{}", locale.0))
}

#[get("/<locale>", rank = 2)]
pub fn home(locale: &str, user: Option<AuthenticatedUser>, cookies: &CookieJar<'_>) -> Result<Json<HomePage>, Status> {
    let locale = Locale::from_code(locale).ok_or(Status::NotFound)?;
    cookies.add(Cookie::new(LOCALE_COOKIE, locale.code()));
    Ok(Json(HomePage {
        locale,
        messages: &locale.messages().home_page,
        languages: i18n::languages(),
        user: user.map(|user| user.0),
    }))
}

#[get("/locales")]
pub fn list_locales() -> Json<Vec<Language>> {
    Json(i18n::languages())
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request<'_>) -> Json<ErrorDetail> {
    Json(ErrorDetail {
        error: status.reason().unwrap_or("Unknown error").to_string(),
    })
}

// This function can be used by main.rs to launch the server
// and by tests to get a Rocket instance.
pub fn rocket_instance(config: AppConfig) -> rocket::Rocket<rocket::Build> {
    rocket::build()
        .attach(db::stage(config))
        .attach(AdHoc::on_liftoff("Purge expired sessions", |rocket| {
            Box::pin(async move {
                if let Some(app) = rocket.state::<TodoApp>() {
                    auth::purge_expired(app.accounts.as_ref());
                }
            })
        }))
        .mount("/", routes![index, home])
        .mount("/api/todos", todo_routes())
        .mount("/api", routes![list_locales])
        .mount("/auth", auth_routes())
        .register("/", catchers![default_catcher])
}
