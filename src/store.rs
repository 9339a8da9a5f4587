//! The graph store and patch engine.
//!
//! Every mutation of a path runs under that path's guard: load, apply to a
//! private copy of the graph, persist in one transaction. A failure anywhere
//! drops the copy, so the stored graph is either fully updated or untouched.
//! Readers take no guard; they see whichever body was last committed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{LinkstoreError, Result};
use crate::graph::{Graph, KeyHasher};
use crate::json::KeyedPatch;
use crate::parse::{parse_turtle, Update};
use crate::persist::{PersistenceMode, Persistor, ResourceKind};
use crate::serialize::to_ntriples;

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    pub created: bool,
    pub triples: usize,
}

/// A committed document as seen by a reader.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub graph: Graph,
    pub modified: DateTime<Utc>,
    content: blake3::Hash,
}

impl Snapshot {
    /// Entity tag of this document rendered as `media_type`. Each
    /// representation of the same content gets its own tag.
    pub fn etag(&self, media_type: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.content.as_bytes());
        hasher.update(media_type.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Hands out one mutual-exclusion guard per path.
#[derive(Debug, Default)]
struct GuardKeeper {
    kept: HashMap<String, Arc<Mutex<()>>, KeyHasher>,
}
impl GuardKeeper {
    fn keep(&mut self, path: &str) -> Arc<Mutex<()>> {
        // drop guards nobody holds any more
        self.kept.retain(|_, guard| Arc::strong_count(guard) > 1);
        Arc::clone(self.kept.entry(path.to_string()).or_default())
    }
}

pub struct Store {
    persistor: Mutex<Persistor>,
    guards: Mutex<GuardKeeper>,
}

fn poisoned<T>(_: T) -> LinkstoreError {
    LinkstoreError::Internal("lock poisoned".into())
}

fn decode(path: &str, body: &[u8]) -> Result<Graph> {
    let text = std::str::from_utf8(body)
        .map_err(|e| LinkstoreError::Persistence(format!("'{path}' holds invalid UTF-8: {e}")))?;
    parse_turtle(text).map_err(|e| LinkstoreError::Persistence(format!("'{path}' is unreadable: {e}")))
}

impl Store {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        Ok(Self {
            persistor: Mutex::new(Persistor::new(&mode)?),
            guards: Mutex::new(GuardKeeper::default()),
        })
    }

    fn persistor(&self) -> Result<MutexGuard<'_, Persistor>> {
        self.persistor.lock().map_err(poisoned)
    }

    fn guard(&self, path: &str) -> Result<Arc<Mutex<()>>> {
        Ok(self.guards.lock().map_err(poisoned)?.keep(path))
    }

    pub fn kind(&self, path: &str) -> Result<Option<ResourceKind>> {
        self.persistor()?.kind(path)
    }

    pub fn container_exists(&self, path: &str) -> Result<bool> {
        Ok(self.kind(path)? == Some(ResourceKind::Container))
    }

    /// The committed graph of a document, `None` when nothing is stored there.
    pub fn load(&self, path: &str) -> Result<Option<Snapshot>> {
        let Some(stored) = self.persistor()?.fetch(path)? else {
            return Ok(None);
        };
        if stored.kind == ResourceKind::Container {
            return Err(LinkstoreError::Conflict(format!("'{path}' is a container")));
        }
        Ok(Some(Snapshot {
            graph: decode(path, &stored.body)?,
            modified: stored.modified,
            content: blake3::hash(&stored.body),
        }))
    }

    /// Applies `change` to the document at `path` (an empty graph when it does
    /// not exist yet) and commits the result as one unit.
    fn mutate<F>(&self, path: &str, change: F) -> Result<Written>
    where
        F: FnOnce(&mut Graph) -> Result<()>,
    {
        let guard = self.guard(path)?;
        let _held = guard.lock().map_err(poisoned)?;
        let stored = self.persistor()?.fetch(path)?;
        let mut graph = match stored {
            Some(stored) if stored.kind == ResourceKind::Container => {
                return Err(LinkstoreError::Conflict(format!("'{path}' is a container")));
            }
            Some(stored) => decode(path, &stored.body)?,
            None => Graph::new(),
        };
        change(&mut graph)?;
        let created = self.persistor()?.write_document(path, to_ntriples(&graph).as_bytes())?;
        debug!(path, triples = graph.len(), created, "graph committed");
        Ok(Written { created, triples: graph.len() })
    }

    /// Swaps the whole graph.
    pub fn replace(&self, path: &str, graph: Graph) -> Result<Written> {
        self.mutate(path, move |current| {
            *current = graph;
            Ok(())
        })
    }

    /// Unions the triples into the graph.
    pub fn merge(&self, path: &str, graph: Graph) -> Result<Written> {
        self.mutate(path, move |current| {
            current.merge(graph);
            Ok(())
        })
    }

    /// `(old - delete) + insert`, deletes matched against the graph as it was
    /// before this update. Deleting an absent triple is a no-op.
    pub fn update(&self, path: &str, update: Update) -> Result<Written> {
        self.mutate(path, move |current| {
            for triple in &update.delete {
                current.remove(triple);
            }
            for triple in update.insert {
                current.insert(triple);
            }
            Ok(())
        })
    }

    /// Keyed overwrite of `(subject, predicate)` object lists.
    pub fn patch(&self, path: &str, patch: KeyedPatch) -> Result<Written> {
        self.mutate(path, move |current| {
            patch.apply(current);
            Ok(())
        })
    }

    /// Removes a document or an empty container.
    pub fn remove(&self, path: &str) -> Result<ResourceKind> {
        let guard = self.guard(path)?;
        let _held = guard.lock().map_err(poisoned)?;
        let mut persistor = self.persistor()?;
        match persistor.kind(path)? {
            None => Err(LinkstoreError::NotFound(format!("'{path}' does not exist"))),
            Some(ResourceKind::Container) if persistor.has_children(path)? => {
                warn!(path, "refusing to delete non-empty container");
                Err(LinkstoreError::Conflict(format!("container '{path}' is not empty")))
            }
            Some(_) => persistor
                .remove(path)?
                .ok_or_else(|| LinkstoreError::NotFound(format!("'{path}' does not exist"))),
        }
    }

    /// Creates a container and any missing ancestors. Fails when anything is
    /// already stored at `path`.
    pub fn make_collection(&self, path: &str) -> Result<()> {
        let guard = self.guard(path)?;
        let _held = guard.lock().map_err(poisoned)?;
        let mut persistor = self.persistor()?;
        match persistor.kind(path)? {
            Some(ResourceKind::Document) => {
                Err(LinkstoreError::Conflict(format!("'{path}' is already a document")))
            }
            Some(ResourceKind::Container) => {
                Err(LinkstoreError::Conflict(format!("'{path}' already exists")))
            }
            None => {
                let mut paths = crate::path::ancestors(path);
                paths.push(path.to_string());
                persistor.create_containers(&paths)?;
                Ok(())
            }
        }
    }

    /// Creates whichever of the given containers are missing; existing ones are fine.
    pub fn ensure_collections(&self, paths: &[String]) -> Result<()> {
        self.persistor()?.create_containers(paths)?;
        Ok(())
    }
}
