// src/packages/manifest.rs

//! Manifest schemas
//!
//! A package manifest is an array of paths (directories), each holding an
//! array of files, plus a script set. Files default to mode 0644 and paths
//! to 0755; committed objects never store a field equal to its default.

use std::cmp::Ordering;

use crate::db::Obj;
use crate::db::schema::{ArraySchema, Field, ObjectSchema, PreCommit, SchemaRef};

use super::{fi, scr};

use super::scalars::{SCALAR_HEXBLOB, SCALAR_INT, SCALAR_MSTRING, SCALAR_OCT, SCALAR_STRING};

fn file_default_int(index: u16) -> Option<u32> {
    match index {
        fi::UID | fi::GID => Some(0),
        fi::MODE => Some(0o644),
        _ => None,
    }
}

fn path_default_int(index: u16) -> Option<u32> {
    match index {
        fi::UID | fi::GID => Some(0),
        fi::MODE => Some(0o755),
        _ => None,
    }
}

fn file_cmp(o1: Obj<'_>, o2: Obj<'_>) -> Ordering {
    o1.cmp_field(&o2, fi::NAME)
}

pub static SCHEMA_FILE: ObjectSchema = ObjectSchema {
    num_fields: fi::MAX,
    fields: &[
        Field {
            index: fi::NAME,
            name: "name",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: fi::HASHES,
            name: "hash",
            schema: SchemaRef::Scalar(&SCALAR_HEXBLOB),
        },
        Field {
            index: fi::UID,
            name: "uid",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: fi::GID,
            name: "gid",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: fi::MODE,
            name: "mode",
            schema: SchemaRef::Scalar(&SCALAR_OCT),
        },
        Field {
            index: fi::XATTRS,
            name: "xattr",
            schema: SchemaRef::Scalar(&SCALAR_HEXBLOB),
        },
    ],
    compare: Some(file_cmp),
    tostring: None,
    fromstring: None,
    default_int: Some(file_default_int),
};

pub static SCHEMA_FILE_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Object(&SCHEMA_FILE),
    max_items: super::MAX_MANIFEST_FILES,
    pre_commit: Some(PreCommit::Sort),
    fromstring: None,
};

pub static SCHEMA_PATH: ObjectSchema = ObjectSchema {
    num_fields: fi::MAX,
    fields: &[
        Field {
            index: fi::NAME,
            name: "name",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: fi::FILES,
            name: "files",
            schema: SchemaRef::Array(&SCHEMA_FILE_ARRAY),
        },
        Field {
            index: fi::UID,
            name: "uid",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: fi::GID,
            name: "gid",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: fi::MODE,
            name: "mode",
            schema: SchemaRef::Scalar(&SCALAR_OCT),
        },
        Field {
            index: fi::XATTRS,
            name: "xattr",
            schema: SchemaRef::Scalar(&SCALAR_HEXBLOB),
        },
    ],
    compare: Some(file_cmp),
    tostring: None,
    fromstring: None,
    default_int: Some(path_default_int),
};

pub static SCHEMA_PATH_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Object(&SCHEMA_PATH),
    max_items: super::MAX_MANIFEST_PATHS,
    pre_commit: Some(PreCommit::Sort),
    fromstring: None,
};

pub static SCHEMA_SCRIPTS: ObjectSchema = ObjectSchema {
    num_fields: scr::MAX,
    fields: &[
        Field {
            index: scr::TRIGGER,
            name: "trigger",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::PRE_INSTALL,
            name: "pre-install",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::POST_INSTALL,
            name: "post-install",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::PRE_DEINSTALL,
            name: "pre-deinstall",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::POST_DEINSTALL,
            name: "post-deinstall",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::PRE_UPGRADE,
            name: "pre-upgrade",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
        Field {
            index: scr::POST_UPGRADE,
            name: "post-upgrade",
            schema: SchemaRef::Scalar(&SCALAR_MSTRING),
        },
    ],
    compare: None,
    tostring: None,
    fromstring: None,
    default_int: None,
};
