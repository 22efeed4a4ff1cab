// todo_starter/src/db.rs
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rocket::fairing::AdHoc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::ViewCache;
use crate::config::{AppConfig, DatabaseConfig};
use crate::services::todos::TodoService;
use crate::store::{AccountRepository, MemoryStore, PgStore, TodoRepository};
use crate::TodoApp;

// an R2D2 connection pool
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Initialize the database pool.
pub fn init_pool(config: &DatabaseConfig) -> Result<PgPool, r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.as_str());
    r2d2::Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
}

pub fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    info!(count = applied.len(), "applied pending migrations");
    Ok(())
}

/// Builds the application state for `config`: Postgres when a database is
/// configured, the in-memory store otherwise.
pub fn build_app(config: AppConfig) -> anyhow::Result<TodoApp> {
    let (todos, accounts): (Arc<dyn TodoRepository>, Arc<dyn AccountRepository>) =
        match &config.database {
            Some(database) => {
                let pool = init_pool(database)?;
                if database.run_migrations {
                    run_migrations(&pool)?;
                }
                let store = Arc::new(PgStore::new(pool));
                (store.clone() as Arc<dyn TodoRepository>, store as Arc<dyn AccountRepository>)
            }
            None => {
                warn!("DATABASE_URL is not set, keeping data in memory");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn TodoRepository>, store as Arc<dyn AccountRepository>)
            }
        };

    let views = if config.cache_views {
        ViewCache::new()
    } else {
        info!("view cache disabled");
        ViewCache::disabled()
    };

    Ok(TodoApp {
        todos: TodoService::new(todos, Arc::new(views)),
        accounts,
        config,
    })
}

// Fairing for attaching the application state to Rocket's managed state
pub fn stage(config: AppConfig) -> AdHoc {
    AdHoc::try_on_ignite("Todo store", |rocket| async move {
        match build_app(config) {
            Ok(app) => Ok(rocket.manage(app)),
            Err(e) => {
                error!(error = %e, "failed to initialise the todo store");
                Err(rocket)
            }
        }
    })
}
