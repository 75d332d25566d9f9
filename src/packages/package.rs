// src/packages/package.rs

//! Package, index and installed-set schemas
//!
//! A package bundles its info, manifest paths, scripts and triggers. In a
//! repository index, packages appear as bare info objects; in the
//! installed set each package is an embedded sub-database with its own
//! magic, so one package can be lifted out without touching the rest.

use std::cmp::Ordering;

use crate::db::Obj;
use crate::db::schema::{ArraySchema, Field, NestedSchema, ObjectSchema, PreCommit, SchemaRef};

use super::manifest::{SCHEMA_PATH_ARRAY, SCHEMA_SCRIPTS};
use super::pkginfo::{SCHEMA_PKGINFO, SCHEMA_PKGINFO_ARRAY};
use super::scalars::SCALAR_STRING;
use super::{SCHEMA_ID_PACKAGE, idb, ndx, pkg};

pub static SCHEMA_STRING_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Scalar(&SCALAR_STRING),
    max_items: super::MAX_PKG_TRIGGERS,
    pre_commit: None,
    fromstring: None,
};

fn package_cmp(o1: Obj<'_>, o2: Obj<'_>) -> Ordering {
    o1.cmp_field(&o2, pkg::INFO)
}

pub static SCHEMA_PACKAGE: ObjectSchema = ObjectSchema {
    num_fields: pkg::MAX,
    fields: &[
        Field {
            index: pkg::INFO,
            name: "info",
            schema: SchemaRef::Object(&SCHEMA_PKGINFO),
        },
        Field {
            index: pkg::PATHS,
            name: "paths",
            schema: SchemaRef::Array(&SCHEMA_PATH_ARRAY),
        },
        Field {
            index: pkg::SCRIPTS,
            name: "scripts",
            schema: SchemaRef::Object(&SCHEMA_SCRIPTS),
        },
        Field {
            index: pkg::TRIGGERS,
            name: "triggers",
            schema: SchemaRef::Array(&SCHEMA_STRING_ARRAY),
        },
    ],
    compare: Some(package_cmp),
    tostring: None,
    fromstring: None,
    default_int: None,
};

/// A package serialized as an independently addressable sub-database.
pub static SCHEMA_PACKAGE_NESTED: NestedSchema = NestedSchema {
    schema_id: SCHEMA_ID_PACKAGE,
    schema: &SCHEMA_PACKAGE,
};

pub static SCHEMA_PACKAGE_NESTED_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Nested(&SCHEMA_PACKAGE_NESTED),
    max_items: super::MAX_INDEX_PACKAGES,
    pre_commit: Some(PreCommit::Sort),
    fromstring: None,
};

pub static SCHEMA_INDEX: ObjectSchema = ObjectSchema {
    num_fields: ndx::MAX,
    fields: &[
        Field {
            index: ndx::DESCRIPTION,
            name: "description",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: ndx::PACKAGES,
            name: "packages",
            schema: SchemaRef::Array(&SCHEMA_PKGINFO_ARRAY),
        },
    ],
    compare: None,
    tostring: None,
    fromstring: None,
    default_int: None,
};

pub static SCHEMA_IDB: ObjectSchema = ObjectSchema {
    num_fields: idb::MAX,
    fields: &[Field {
        index: idb::PACKAGES,
        name: "packages",
        schema: SchemaRef::Array(&SCHEMA_PACKAGE_NESTED_ARRAY),
    }],
    compare: None,
    tostring: None,
    fromstring: None,
    default_int: None,
};

#[cfg(test)]
mod tests {
    use super::super::{SCHEMA_ID_INSTALLED, pi};
    use super::*;
    use crate::db::Database;
    use crate::db::builder::{ArrayBuilder, ObjectBuilder};
    use crate::db::value::Value;

    /// Build one package as its own sub-database and return it.
    fn build_package(name: &[u8], version: &[u8], uid: u32) -> Database {
        let mut db = Database::new(SCHEMA_ID_PACKAGE);
        let mut info = ObjectBuilder::new(&SCHEMA_PKGINFO);
        info.set_blob(&mut db, pi::NAME, name);
        info.set_blob(&mut db, pi::VERSION, version);
        info.set_int(&mut db, pi::UNIQUE_ID, uid);
        let info = info.commit(&mut db);
        let mut p = ObjectBuilder::new(&SCHEMA_PACKAGE);
        p.set(pkg::INFO, info);
        let root = p.commit(&mut db);
        db.set_root(root);
        db
    }

    fn build_installed(pkgs: Vec<Database>) -> Database {
        let mut db = Database::new(SCHEMA_ID_INSTALLED);
        let mut arr = ArrayBuilder::new(&SCHEMA_PACKAGE_NESTED_ARRAY);
        for p in pkgs {
            let v = db.w_nested(p);
            arr.append(v);
        }
        let packages = arr.commit(&mut db);
        let mut root = ObjectBuilder::new(&SCHEMA_IDB);
        root.set(idb::PACKAGES, packages);
        let root = root.commit(&mut db);
        db.set_root(root);
        db
    }

    #[test]
    fn test_installed_set_sorts_embedded_packages() {
        let db = build_installed(vec![
            build_package(b"zlib", b"1.3", 1),
            build_package(b"busybox", b"1.36.1", 2),
        ]);
        let root = db.obj(&SCHEMA_IDB, db.root()).unwrap();
        let pkgs = root.arr(idb::PACKAGES).unwrap();
        let names: Vec<String> = pkgs
            .objs()
            .filter_map(|p| p.obj(pkg::INFO))
            .filter_map(|i| i.text(pi::NAME).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["busybox", "zlib"]);
    }

    #[test]
    fn test_same_name_version_orders_by_unique_id() {
        let db = build_installed(vec![
            build_package(b"pkg", b"1.0", 900),
            build_package(b"pkg", b"1.0", 100),
        ]);
        let root = db.obj(&SCHEMA_IDB, db.root()).unwrap();
        let pkgs = root.arr(idb::PACKAGES).unwrap();
        assert_eq!(pkgs.len(), 2);
        let uids: Vec<u32> = pkgs
            .objs()
            .filter_map(|p| p.obj(pkg::INFO))
            .map(|i| i.int(pi::UNIQUE_ID))
            .collect();
        assert_eq!(uids, vec![100, 900]);
    }

    #[test]
    fn test_error_package_contaminates_installed_set() {
        let mut db = Database::new(SCHEMA_ID_INSTALLED);
        let mut arr = ArrayBuilder::new(&SCHEMA_PACKAGE_NESTED_ARRAY);
        arr.append(Value::Error(crate::db::value::ErrorCode::Format));
        assert!(arr.commit(&mut db).is_error());
    }
}
