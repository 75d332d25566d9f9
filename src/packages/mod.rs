// src/packages/mod.rs

//! Domain schemas
//!
//! Declarative layouts for the package entities: dependency, package info,
//! file, path, scripts, package, repository index and the installed set.
//! Field indices are stable and appear verbatim in committed databases;
//! renumbering them breaks every existing file.

pub mod dependency;
pub mod index;
pub mod manifest;
pub mod package;
pub mod pkginfo;
pub mod scalars;

use std::cmp::Ordering;

use crate::db::Database;
use crate::db::schema::{ObjectSchema, SchemaId, SchemaRef};

/// Top-level schema id of a repository index.
pub const SCHEMA_ID_INDEX: SchemaId = SchemaId::from_tag(*b"indx");
/// Top-level schema id of a single package (also used for nested
/// per-package sub-databases).
pub const SCHEMA_ID_PACKAGE: SchemaId = SchemaId::from_tag(*b"pckg");
/// Top-level schema id of the installed set.
pub const SCHEMA_ID_INSTALLED: SchemaId = SchemaId::from_tag(*b"idb\0");

/// Dependency object fields.
pub mod dep {
    pub const NAME: u16 = 1;
    pub const VERSION: u16 = 2;
    pub const MATCH: u16 = 3;
    pub const MAX: u16 = 4;
}

/// Package info fields.
pub mod pi {
    pub const NAME: u16 = 1;
    pub const VERSION: u16 = 2;
    pub const UNIQUE_ID: u16 = 3;
    pub const DESCRIPTION: u16 = 4;
    pub const ARCH: u16 = 5;
    pub const LICENSE: u16 = 6;
    pub const ORIGIN: u16 = 7;
    pub const MAINTAINER: u16 = 8;
    pub const URL: u16 = 9;
    pub const REPO_COMMIT: u16 = 10;
    pub const BUILD_TIME: u16 = 11;
    pub const INSTALLED_SIZE: u16 = 12;
    pub const FILE_SIZE: u16 = 13;
    pub const PRIORITY: u16 = 14;
    pub const DEPENDS: u16 = 15;
    pub const PROVIDES: u16 = 16;
    pub const REPLACES: u16 = 17;
    pub const INSTALL_IF: u16 = 18;
    pub const RECOMMENDS: u16 = 19;
    pub const MAX: u16 = 20;
}

/// File and path (directory) fields. Files and paths share the index
/// space; a file's content hash and a path's file list occupy the same
/// slot.
pub mod fi {
    pub const NAME: u16 = 1;
    pub const HASHES: u16 = 2;
    pub const FILES: u16 = 2;
    pub const UID: u16 = 3;
    pub const GID: u16 = 4;
    pub const MODE: u16 = 5;
    pub const XATTRS: u16 = 6;
    pub const MAX: u16 = 7;
}

/// Script hook fields.
pub mod scr {
    pub const TRIGGER: u16 = 1;
    pub const PRE_INSTALL: u16 = 2;
    pub const POST_INSTALL: u16 = 3;
    pub const PRE_DEINSTALL: u16 = 4;
    pub const POST_DEINSTALL: u16 = 5;
    pub const PRE_UPGRADE: u16 = 6;
    pub const POST_UPGRADE: u16 = 7;
    pub const MAX: u16 = 8;
}

/// Package fields.
pub mod pkg {
    pub const INFO: u16 = 1;
    pub const PATHS: u16 = 2;
    pub const SCRIPTS: u16 = 3;
    pub const TRIGGERS: u16 = 4;
    pub const MAX: u16 = 5;
}

/// Repository index fields.
pub mod ndx {
    pub const DESCRIPTION: u16 = 1;
    pub const PACKAGES: u16 = 2;
    pub const MAX: u16 = 3;
}

/// Installed-set fields.
pub mod idb {
    pub const PACKAGES: u16 = 1;
    pub const MAX: u16 = 2;
}

pub const MAX_PKG_TRIGGERS: u32 = 256;
pub const MAX_PKG_DEPENDENCIES: u32 = 4096;
pub const MAX_INDEX_PACKAGES: u32 = 1 << 20;
pub const MAX_MANIFEST_FILES: u32 = 1 << 20;
pub const MAX_MANIFEST_PATHS: u32 = 1 << 16;

/// Resolve the object schema bound to a top-level schema id.
pub fn schema_for_id(id: SchemaId) -> Option<&'static ObjectSchema> {
    if id == SCHEMA_ID_INDEX {
        Some(&package::SCHEMA_INDEX)
    } else if id == SCHEMA_ID_PACKAGE {
        Some(&package::SCHEMA_PACKAGE)
    } else if id == SCHEMA_ID_INSTALLED {
        Some(&package::SCHEMA_IDB)
    } else {
        None
    }
}

/// Order two databases of the same schema by their root values. Returns
/// `None` when the schema ids differ or are unknown.
pub fn compare_databases(a: &Database, b: &Database) -> Option<Ordering> {
    if a.schema_id() != b.schema_id() {
        return None;
    }
    let schema = schema_for_id(a.schema_id())?;
    Some(SchemaRef::Object(schema).compare_values(a, a.root(), b, b.root()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_registry() {
        assert!(schema_for_id(SCHEMA_ID_INDEX).is_some());
        assert!(schema_for_id(SCHEMA_ID_PACKAGE).is_some());
        assert!(schema_for_id(SCHEMA_ID_INSTALLED).is_some());
        assert!(schema_for_id(SchemaId::from_tag(*b"nope")).is_none());
    }
}
