//! Per-user cache of rendered views.
//!
//! Reads of a user's todo list are served from here until a mutation
//! revalidates the path they were rendered for. Each user carries a
//! generation counter that every revalidation bumps; a view rendered under an
//! older generation is never stored.

use dashmap::DashMap;
use uuid::Uuid;

pub const ROOT_PATH: &str = "/";

#[derive(Default)]
pub struct ViewCache {
    enabled: bool,
    views: DashMap<(Uuid, String), String>,
    generations: DashMap<Uuid, u64>,
}

impl ViewCache {
    pub fn new() -> Self {
        ViewCache { enabled: true, ..Self::default() }
    }

    /// A cache that never stores anything. Used when several processes share
    /// one database and a local revalidation cannot see their writes.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The current generation for `owner`. Read it before rendering and hand
    /// it back to [`ViewCache::put`].
    pub fn generation(&self, owner: Uuid) -> u64 {
        self.generations.get(&owner).map(|g| *g).unwrap_or(0)
    }

    pub fn get(&self, owner: Uuid, path: &str) -> Option<String> {
        self.views
            .get(&(owner, path.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Stores `body` unless `owner` was revalidated since `generation` was
    /// read. Returns whether the view was stored.
    pub fn put(&self, owner: Uuid, path: &str, body: String, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        // Holding the generation entry keeps a revalidation from slipping in
        // between the check and the insert.
        let current = self.generations.entry(owner).or_insert(0);
        if *current != generation {
            tracing::debug!(%owner, path, "discarded view rendered before revalidation");
            return false;
        }
        self.views.insert((owner, path.to_string()), body);
        true
    }

    /// Marks every view of `owner` rendered at `path` or below it as stale.
    pub fn revalidate_path(&self, owner: Uuid, path: &str) {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let mut current = self.generations.entry(owner).or_insert(0);
        *current += 1;
        self.views.retain(|(view_owner, view_path), _| {
            *view_owner != owner || !(view_path == path || view_path.starts_with(&prefix))
        });
        drop(current);
        tracing::debug!(%owner, path, "revalidated cached views");
    }
}
