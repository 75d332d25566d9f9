// src/store.rs

//! Managed filesystem root
//!
//! A root directory holds everything the keeper persists: a lock file, a
//! keys directory for trusted signing keys, the serialized installed set,
//! a cache of repository indices keyed by URL hash, the repository list
//! and the sync-state file. Layer 0 is `root`, layer 1 is `uvol`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::builder::ObjectBuilder;
use crate::db::{Database, format};
use crate::error::{Error, Result};
use crate::packages::package::SCHEMA_IDB;
use crate::packages::scalars::to_hex;
use crate::packages::{SCHEMA_ID_INSTALLED, idb};
use crate::stream::{GzipWriter, gunzip};

pub const LAYER_ROOT: u32 = 0;
pub const LAYER_UVOL: u32 = 1;

/// Name of a database layer; future layers occupy contiguous ids.
pub fn layer_name(layer: u32) -> Option<&'static str> {
    match layer {
        LAYER_ROOT => Some("root"),
        LAYER_UVOL => Some("uvol"),
        _ => None,
    }
}

const LOCK_FILE: &str = "lock";
const KEYS_DIR: &str = "keys";
const CACHE_DIR: &str = "cache";
const INSTALLED_FILE: &str = "installed.ldb";
const REPOSITORIES_FILE: &str = "repositories";
const STATE_FILE: &str = "state.json";

/// Initialize a managed root at the given path.
///
/// Creates the directory tree and an empty repository list. Idempotent:
/// calling it on an existing root is safe.
pub fn init(root: impl AsRef<Path>) -> Result<()> {
    let root = root.as_ref();
    debug!("initializing root at {}", root.display());

    fs::create_dir_all(root)
        .map_err(|e| Error::InitError(format!("Failed to create root directory: {e}")))?;
    fs::create_dir_all(root.join(KEYS_DIR))?;
    fs::create_dir_all(root.join(CACHE_DIR))?;
    let repos = root.join(REPOSITORIES_FILE);
    if !repos.exists() {
        fs::write(&repos, "")?;
    }

    info!("root initialized at {}", root.display());
    Ok(())
}

/// An opened managed root. Opening with a lock excludes other writers;
/// the lock is released on drop.
pub struct Store {
    root: PathBuf,
    locked: bool,
}

impl Store {
    /// Open for writing, taking the lock file.
    pub fn open(root: impl AsRef<Path>) -> Result<Store> {
        let mut store = Store::open_unlocked(root)?;
        let lock = store.root.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut f) => {
                let _ = write!(f, "{}", std::process::id());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Locked(lock.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        store.locked = true;
        Ok(store)
    }

    /// Open for read-only queries without taking the lock.
    pub fn open_unlocked(root: impl AsRef<Path>) -> Result<Store> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::DatabaseNotFound(root.display().to_string()));
        }
        Ok(Store {
            root: root.to_path_buf(),
            locked: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join(KEYS_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn installed_path(&self) -> PathBuf {
        self.root.join(INSTALLED_FILE)
    }

    pub fn repositories_path(&self) -> PathBuf {
        self.root.join(REPOSITORIES_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Cache file for a repository URL, keyed by its content hash.
    pub fn cached_index_path(&self, url: &str) -> PathBuf {
        self.cache_dir().join(format!("{}.ldb", cache_key(url)))
    }

    /// Configured repository URLs, one per line; `#` starts a comment.
    pub fn read_repositories(&self) -> Result<Vec<String>> {
        let text = match fs::read_to_string(self.repositories_path()) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect())
    }

    /// Load the installed set; a missing file yields an empty set.
    pub fn load_installed(&self) -> Result<Database> {
        let path = self.installed_path();
        let mut raw = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no installed set at {}, starting empty", path.display());
                return Ok(empty_installed());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.starts_with(&[0x1f, 0x8b]) {
            let mut plain = Vec::new();
            gunzip(&raw[..]).read_to_end(&mut plain)?;
            raw = plain;
        }
        let db = format::from_bytes(&raw)?;
        if db.schema_id() != SCHEMA_ID_INSTALLED {
            return Err(Error::BadFormat(format!(
                "{} is not an installed set",
                path.display()
            )));
        }
        Ok(db)
    }

    /// Save the installed set: gzip-compressed, written to a temporary
    /// file and atomically renamed into place.
    pub fn save_installed(&self, db: &Database) -> Result<()> {
        let path = self.installed_path();
        let tmp = path.with_extension("tmp");
        let bytes = format::to_vec(db)?;
        let mut out = GzipWriter::new(File::create(&tmp)?);
        out.write_all(&bytes)?;
        out.finish()?.sync_all()?;
        fs::rename(&tmp, &path)?;
        info!("installed set written to {}", path.display());
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.locked {
            let _ = fs::remove_file(self.root.join(LOCK_FILE));
        }
    }
}

/// Stable cache key for a repository URL.
pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    to_hex(&digest.as_slice()[..8])
}

fn empty_installed() -> Database {
    let mut db = Database::new(SCHEMA_ID_INSTALLED);
    let packages = db.intern_array(Vec::new());
    let mut root = ObjectBuilder::new(&SCHEMA_IDB);
    root.set(idb::PACKAGES, packages);
    let root = root.commit(&mut db);
    db.set_root(root);
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("larder");
        init(&root).unwrap();
        assert!(root.join("keys").is_dir());
        assert!(root.join("cache").is_dir());
        assert!(root.join("repositories").is_file());
        // idempotent
        init(&root).unwrap();
    }

    #[test]
    fn test_open_nonexistent_root() {
        let result = Store::open_unlocked("/nonexistent/path/larder");
        assert!(matches!(result, Err(Error::DatabaseNotFound(_))));
    }

    #[test]
    fn test_lock_excludes_second_writer() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        let first = Store::open(dir.path()).unwrap();
        assert!(matches!(Store::open(dir.path()), Err(Error::Locked(_))));
        drop(first);
        Store::open(dir.path()).unwrap();
    }

    #[test]
    fn test_installed_round_trip() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        let store = Store::open(dir.path()).unwrap();

        let empty = store.load_installed().unwrap();
        assert_eq!(empty.schema_id(), SCHEMA_ID_INSTALLED);

        store.save_installed(&empty).unwrap();
        let loaded = store.load_installed().unwrap();
        assert_eq!(loaded.root(), empty.root());
        assert_eq!(format::to_vec(&loaded).unwrap(), format::to_vec(&empty).unwrap());
    }

    #[test]
    fn test_repositories_parsing() {
        let dir = tempdir().unwrap();
        init(dir.path()).unwrap();
        fs::write(
            dir.path().join("repositories"),
            "# main\nhttps://example.com/main\n\nhttps://example.com/community\n",
        )
        .unwrap();
        let store = Store::open_unlocked(dir.path()).unwrap();
        let repos = store.read_repositories().unwrap();
        assert_eq!(
            repos,
            vec![
                "https://example.com/main".to_string(),
                "https://example.com/community".to_string()
            ]
        );
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = cache_key("https://example.com/main");
        let b = cache_key("https://example.com/main");
        let c = cache_key("https://example.com/community");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(layer_name(LAYER_ROOT), Some("root"));
        assert_eq!(layer_name(LAYER_UVOL), Some("uvol"));
        assert_eq!(layer_name(7), None);
    }
}
