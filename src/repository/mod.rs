// src/repository/mod.rs

//! Repository management
//!
//! Fetches repository indices, validates them, and keeps a local cache
//! under the managed root together with a sync-state file recording when
//! each repository was last seen. Conditional fetches use the stored
//! last-modified time so an unchanged index costs one request.

pub mod fetch;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{Database, format};
use crate::error::{Error, FetchError, Result};
use crate::packages::{SCHEMA_ID_INDEX, ndx, package::SCHEMA_INDEX};
use crate::store::Store;
use crate::stream::gunzip;

/// File name of the serialized index below a repository URL.
pub const INDEX_NAME: &str = "index.ldb.gz";

/// Per-repository sync record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoState {
    pub description: Option<String>,
    pub last_sync: Option<String>,
    pub last_modified: Option<String>,
}

/// Sync-state file: one record per repository URL.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub repositories: HashMap<String, RepoState>,
}

impl SyncState {
    pub fn load(store: &Store) -> Result<SyncState> {
        let path = store.state_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::BadFormat(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        let path = store.state_path();
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::InitError(format!("Failed to encode sync state: {e}")))?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Fetch and cache the index of every configured repository.
pub fn sync_repositories(store: &Store, force: bool) -> Result<SyncSummary> {
    let urls = store.read_repositories()?;
    let mut state = SyncState::load(store)?;
    let mut summary = SyncSummary::default();

    for url in urls {
        match sync_one(store, &mut state, &url, force) {
            Ok(true) => summary.updated += 1,
            Ok(false) => summary.unchanged += 1,
            Err(e) => {
                warn!("sync of {url} failed: {e}");
                summary.errors += 1;
            }
        }
    }

    state.save(store)?;
    info!(
        "synchronized repositories: {} updated, {} unchanged, {} errors",
        summary.updated, summary.unchanged, summary.errors
    );
    Ok(summary)
}

fn sync_one(store: &Store, state: &mut SyncState, url: &str, force: bool) -> Result<bool> {
    let index_url = format!("{}/{}", url.trim_end_matches('/'), INDEX_NAME);
    let entry = state.repositories.entry(url.to_string()).or_default();

    let since = if force {
        None
    } else {
        entry
            .last_modified
            .as_deref()
            .and_then(parse_timestamp)
            .filter(|_| store.cached_index_path(url).exists())
    };

    let stream = match fetch::open(&index_url, since) {
        Ok(s) => s,
        Err(Error::Fetch(FetchError::Unchanged)) => {
            debug!("{url}: index unchanged");
            entry.last_sync = Some(current_timestamp());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let mtime = stream.meta().mtime;
    let db = load_index_stream(stream)?;

    let path = store.cached_index_path(url);
    let tmp = path.with_extension("tmp");
    let mut out = File::create(&tmp)?;
    format::write(&db, &mut out)?;
    fs::rename(&tmp, &path)?;

    entry.description = index_description(&db);
    entry.last_sync = Some(current_timestamp());
    entry.last_modified = mtime.map(format_timestamp);
    debug!("{url}: index cached at {}", path.display());
    Ok(true)
}

/// Decode a gzip-compressed index database from a stream.
pub fn load_index_stream(stream: impl Read) -> Result<Database> {
    let mut raw = Vec::new();
    gunzip(stream).read_to_end(&mut raw)?;
    let db = format::from_bytes(&raw)?;
    if db.schema_id() != SCHEMA_ID_INDEX {
        return Err(Error::BadFormat("not a repository index".into()));
    }
    if let Some(e) = db.root().error() {
        return Err(Error::BadFormat(format!("index root: {e}")));
    }
    Ok(db)
}

/// Load a cached repository index.
pub fn load_index(store: &Store, url: &str) -> Result<Database> {
    let path = store.cached_index_path(url);
    let bytes = fs::read(&path)
        .map_err(|_| Error::DatabaseNotFound(path.display().to_string()))?;
    let db = format::from_bytes(&bytes)?;
    if db.schema_id() != SCHEMA_ID_INDEX {
        return Err(Error::BadFormat("not a repository index".into()));
    }
    Ok(db)
}

fn index_description(db: &Database) -> Option<String> {
    db.obj(&SCHEMA_INDEX, db.root())?
        .text(ndx::DESCRIPTION)
        .map(str::to_string)
}

/// Current timestamp as an ISO 8601 string.
fn current_timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn format_timestamp(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339()
}

fn parse_timestamp(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(s).ok().map(SystemTime::from)
}
