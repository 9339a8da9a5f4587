// used for persistence
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{LinkstoreError, Result};
use crate::path::ancestors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Container,
    Document,
}
impl ResourceKind {
    fn code(self) -> i64 {
        match self {
            ResourceKind::Container => 0,
            ResourceKind::Document => 1,
        }
    }
    fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ResourceKind::Container),
            1 => Ok(ResourceKind::Document),
            other => Err(LinkstoreError::Persistence(format!("unknown resource kind {other}"))),
        }
    }
}

/// A row of the Resource table. Containers have an empty body.
#[derive(Debug, Clone)]
pub struct Stored {
    pub kind: ResourceKind,
    pub body: Vec<u8>,
    pub modified: DateTime<Utc>,
}

fn kind_of(connection: &Connection, path: &str) -> Result<Option<ResourceKind>> {
    let code: Option<i64> = connection
        .query_row(
            "select Kind from Resource where Resource_Path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    code.map(ResourceKind::from_code).transpose()
}

// Creates missing containers along the way, like a recursive mkdir.
fn ensure_containers(connection: &Connection, paths: &[String], now: &DateTime<Utc>) -> Result<bool> {
    let mut created = false;
    for path in paths {
        match kind_of(connection, path)? {
            Some(ResourceKind::Document) => {
                return Err(LinkstoreError::Conflict(format!("'{path}' is a document, not a container")));
            }
            Some(ResourceKind::Container) => created = false,
            None => {
                connection.execute(
                    "insert into Resource (Resource_Path, Kind, Body, Modified) values (?1, ?2, null, ?3)",
                    params![path, ResourceKind::Container.code(), now],
                )?;
                created = true;
            }
        }
    }
    Ok(created)
}

pub struct Persistor {
    connection: Connection,
}
impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // Every resource is a row keyed by its path; documents carry their
        // graph as N-Triples in the order the triples were asserted.
        connection.execute_batch(
            "
            create table if not exists Resource (
                Resource_Path text not null,
                Kind integer not null,
                Body blob null,
                Modified text not null,
                constraint unique_and_referenceable_Resource_Path primary key (
                    Resource_Path
                )
            );
            ",
        )?;
        Ok(Self { connection })
    }
    pub fn kind(&self, path: &str) -> Result<Option<ResourceKind>> {
        kind_of(&self.connection, path)
    }
    pub fn fetch(&self, path: &str) -> Result<Option<Stored>> {
        let row = self
            .connection
            .query_row(
                "select Kind, Body, Modified from Resource where Resource_Path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((kind, body, modified)) => Ok(Some(Stored {
                kind: ResourceKind::from_code(kind)?,
                body: body.unwrap_or_default(),
                modified,
            })),
        }
    }
    /// Stores a document body, creating its ancestors. Returns whether the
    /// document is new. Runs in one transaction.
    pub fn write_document(&mut self, path: &str, body: &[u8]) -> Result<bool> {
        let now = Utc::now();
        let transaction = self.connection.transaction()?;
        ensure_containers(&transaction, &ancestors(path), &now)?;
        let created = match kind_of(&transaction, path)? {
            Some(ResourceKind::Container) => {
                return Err(LinkstoreError::Conflict(format!("'{path}' is a container")));
            }
            Some(ResourceKind::Document) => false,
            None => true,
        };
        transaction.execute(
            "insert into Resource (Resource_Path, Kind, Body, Modified) values (?1, ?2, ?3, ?4)
             on conflict (Resource_Path) do update set Body = excluded.Body, Modified = excluded.Modified",
            params![path, ResourceKind::Document.code(), body, now],
        )?;
        transaction.commit()?;
        debug!(path, bytes = body.len(), created, "document written");
        Ok(created)
    }
    /// Creates every given container that is missing. Returns whether the last
    /// one was created by this call.
    pub fn create_containers(&mut self, paths: &[String]) -> Result<bool> {
        let now = Utc::now();
        let transaction = self.connection.transaction()?;
        let created = ensure_containers(&transaction, paths, &now)?;
        transaction.commit()?;
        Ok(created)
    }
    pub fn remove(&mut self, path: &str) -> Result<Option<ResourceKind>> {
        let transaction = self.connection.transaction()?;
        let kind = kind_of(&transaction, path)?;
        if kind.is_some() {
            transaction.execute("delete from Resource where Resource_Path = ?1", params![path])?;
        }
        transaction.commit()?;
        Ok(kind)
    }
    pub fn has_children(&self, path: &str) -> Result<bool> {
        let prefix = format!("{path}/");
        let found: bool = self.connection.query_row(
            "select exists (select 1 from Resource where substr(Resource_Path, 1, length(?1)) = ?1)",
            params![prefix],
            |row| row.get(0),
        )?;
        Ok(found)
    }
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("select count(*) from Resource", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
