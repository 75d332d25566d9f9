// src/query.rs

//! Queries over a loaded installed set
//!
//! Builds flat lookup maps over the installed database: packages by name,
//! by provided name, file ownership by `(dir, basename)` (unique, O(1)
//! amortized), and reverse dependency / reverse install-if relations.
//! The index borrows nothing; look packages back up through the database
//! that built it.

use std::collections::HashMap;

use tracing::warn;

use crate::db::value::Value;
use crate::db::{Database, Obj};
use crate::error::{Error, Result};
use crate::packages::dependency::Dependency;
use crate::packages::package::{SCHEMA_IDB, SCHEMA_PACKAGE};
use crate::packages::{SCHEMA_ID_INSTALLED, fi, idb, pi, pkg};

/// Position of a package in the installed array.
pub type PkgId = usize;

#[derive(Debug, Default)]
pub struct QueryIndex {
    packages: Vec<Value>,
    by_name: HashMap<String, Vec<PkgId>>,
    by_provides: HashMap<String, Vec<PkgId>>,
    file_owner: HashMap<(String, String), PkgId>,
    rdepends: HashMap<String, Vec<PkgId>>,
    rinstall_if: HashMap<String, Vec<PkgId>>,
}

fn push_unique(map: &mut HashMap<String, Vec<PkgId>>, key: &str, id: PkgId) {
    let ids = map.entry(key.to_string()).or_default();
    if ids.last() != Some(&id) {
        ids.push(id);
    }
}

impl QueryIndex {
    /// Walk an installed database and build the lookup maps.
    pub fn build(db: &Database) -> Result<QueryIndex> {
        if db.schema_id() != SCHEMA_ID_INSTALLED {
            return Err(Error::BadFormat("not an installed set".into()));
        }
        let root = db
            .obj(&SCHEMA_IDB, db.root())
            .ok_or_else(|| Error::BadFormat("installed set has no root object".into()))?;
        let mut index = QueryIndex::default();
        let Some(pkgs) = root.arr(idb::PACKAGES) else {
            return Ok(index);
        };

        for i in 0..pkgs.len() {
            index.packages.push(pkgs.get(i));
            let Some(p) = pkgs.obj_at(i) else { continue };
            let Some(info) = p.obj(pkg::INFO) else {
                continue;
            };
            if let Some(name) = info.text(pi::NAME) {
                push_unique(&mut index.by_name, name, i);
            }
            index.scan_relation(&info, pi::PROVIDES, i, Relation::Provides);
            index.scan_relation(&info, pi::DEPENDS, i, Relation::Depends);
            index.scan_relation(&info, pi::INSTALL_IF, i, Relation::InstallIf);
            index.scan_files(&p, i);
        }
        Ok(index)
    }

    fn scan_relation(&mut self, info: &Obj<'_>, field: u16, id: PkgId, rel: Relation) {
        let Some(deps) = info.arr(field) else { return };
        for dep in deps.objs() {
            let Some(name) = dep.text(crate::packages::dep::NAME) else {
                continue;
            };
            let map = match rel {
                Relation::Provides => &mut self.by_provides,
                Relation::Depends => &mut self.rdepends,
                Relation::InstallIf => &mut self.rinstall_if,
            };
            push_unique(map, name, id);
        }
    }

    fn scan_files(&mut self, p: &Obj<'_>, id: PkgId) {
        let Some(paths) = p.arr(pkg::PATHS) else { return };
        for path in paths.objs() {
            let Some(dir) = path.text(fi::NAME) else {
                continue;
            };
            let Some(files) = path.arr(fi::FILES) else {
                continue;
            };
            for file in files.objs() {
                if let Some(name) = file.text(fi::NAME) {
                    self.file_owner
                        .insert((dir.to_string(), name.to_string()), id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Look one package back up in its database.
    pub fn package<'a>(&self, db: &'a Database, id: PkgId) -> Option<Obj<'a>> {
        let v = *self.packages.get(id)?;
        db.obj(&SCHEMA_PACKAGE, v)
    }

    pub fn ids_by_name(&self, name: &str) -> &[PkgId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Packages that carry or provide the given name, in installed order.
    pub fn providers(&self, name: &str) -> Vec<PkgId> {
        let mut ids: Vec<PkgId> = self
            .ids_by_name(name)
            .iter()
            .chain(self.by_provides.get(name).map(Vec::as_slice).unwrap_or(&[]))
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Owner of an absolute file path. `(dir, basename)` identifies a
    /// file uniquely.
    pub fn owner_of(&self, path: &str) -> Option<PkgId> {
        let trimmed = path.trim_start_matches('/');
        let (dir, base) = match trimmed.rsplit_once('/') {
            Some((dir, base)) => (dir, base),
            None => ("", trimmed),
        };
        self.file_owner.get(&(dir.to_string(), base.to_string())).copied()
    }

    /// Installed packages that depend on the given name.
    pub fn rdepends_of(&self, name: &str) -> &[PkgId] {
        self.rdepends.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Installed packages whose install-if mentions the given name.
    pub fn rinstall_if_of(&self, name: &str) -> &[PkgId] {
        self.rinstall_if.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any installed provider satisfies the dependency.
    pub fn is_satisfied(&self, db: &Database, dep: &Dependency) -> bool {
        let ids = self.providers(&dep.name);
        if ids.is_empty() {
            // A conflict is satisfied precisely by absence.
            return dep.mask.contains(crate::version::Match::CONFLICT);
        }
        ids.iter().any(|&id| {
            let Some(p) = self.package(db, id) else {
                return false;
            };
            let Some(info) = p.obj(pkg::INFO) else {
                return false;
            };
            let name = info.text(pi::NAME).unwrap_or_default();
            let version = info.blob(pi::VERSION).unwrap_or_default();
            match dep.is_satisfied_by(name, version) {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("{dep}: {e}");
                    false
                }
            }
        })
    }
}

enum Relation {
    Provides,
    Depends,
    InstallIf,
}
