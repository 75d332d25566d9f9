// src/packages/pkginfo.rs

//! Package info schema
//!
//! Identifying metadata for one package version. Ordering cascades over
//! name, version and unique id, so two builds of the same version remain
//! distinct entries. Also home to the legacy one-character field codes
//! used by textual indices.

use std::cmp::Ordering;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::db::builder::ObjectBuilder;
use crate::db::schema::{ArraySchema, Field, ObjectSchema, PreCommit, SchemaRef};
use crate::db::value::{ErrorCode, Value};
use crate::db::{Database, Obj};

use super::dependency::SCHEMA_DEPENDENCY_ARRAY;
use super::pi;
use super::scalars::{
    SCALAR_HEXBLOB, SCALAR_HSIZE, SCALAR_INT, SCALAR_STRING, SCALAR_VERSION, from_hex,
};

fn pkginfo_cmp(o1: Obj<'_>, o2: Obj<'_>) -> Ordering {
    o1.cmp_field(&o2, pi::NAME)
        .then_with(|| o1.cmp_field(&o2, pi::VERSION))
        .then_with(|| o1.cmp_field(&o2, pi::UNIQUE_ID))
}

pub static SCHEMA_PKGINFO: ObjectSchema = ObjectSchema {
    num_fields: pi::MAX,
    fields: &[
        Field {
            index: pi::NAME,
            name: "name",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::VERSION,
            name: "version",
            schema: SchemaRef::Scalar(&SCALAR_VERSION),
        },
        Field {
            index: pi::UNIQUE_ID,
            name: "unique-id",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: pi::DESCRIPTION,
            name: "description",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::ARCH,
            name: "arch",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::LICENSE,
            name: "license",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::ORIGIN,
            name: "origin",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::MAINTAINER,
            name: "maintainer",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::URL,
            name: "url",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: pi::REPO_COMMIT,
            name: "repo-commit",
            schema: SchemaRef::Scalar(&SCALAR_HEXBLOB),
        },
        Field {
            index: pi::BUILD_TIME,
            name: "build-time",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: pi::INSTALLED_SIZE,
            name: "installed-size",
            schema: SchemaRef::Scalar(&SCALAR_HSIZE),
        },
        Field {
            index: pi::FILE_SIZE,
            name: "file-size",
            schema: SchemaRef::Scalar(&SCALAR_HSIZE),
        },
        Field {
            index: pi::PRIORITY,
            name: "priority",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
        Field {
            index: pi::DEPENDS,
            name: "depends",
            schema: SchemaRef::Array(&SCHEMA_DEPENDENCY_ARRAY),
        },
        Field {
            index: pi::PROVIDES,
            name: "provides",
            schema: SchemaRef::Array(&SCHEMA_DEPENDENCY_ARRAY),
        },
        Field {
            index: pi::REPLACES,
            name: "replaces",
            schema: SchemaRef::Array(&SCHEMA_DEPENDENCY_ARRAY),
        },
        Field {
            index: pi::INSTALL_IF,
            name: "install-if",
            schema: SchemaRef::Array(&SCHEMA_DEPENDENCY_ARRAY),
        },
        Field {
            index: pi::RECOMMENDS,
            name: "recommends",
            schema: SchemaRef::Array(&SCHEMA_DEPENDENCY_ARRAY),
        },
    ],
    compare: Some(pkginfo_cmp),
    tostring: None,
    fromstring: None,
    default_int: None,
};

pub static SCHEMA_PKGINFO_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Object(&SCHEMA_PKGINFO),
    max_items: super::MAX_INDEX_PACKAGES,
    pre_commit: Some(PreCommit::Sort),
    fromstring: None,
};

/// Canonical field index for a legacy one-character field code; 0 means
/// "no field".
pub fn field_index_for_tag(tag: u8) -> u16 {
    match tag {
        b'C' => pi::UNIQUE_ID,
        b'P' => pi::NAME,
        b'V' => pi::VERSION,
        b'T' => pi::DESCRIPTION,
        b'U' => pi::URL,
        b'I' => pi::INSTALLED_SIZE,
        b'S' => pi::FILE_SIZE,
        b'L' => pi::LICENSE,
        b'A' => pi::ARCH,
        b'D' => pi::DEPENDS,
        b'i' => pi::INSTALL_IF,
        b'p' => pi::PROVIDES,
        b'o' => pi::ORIGIN,
        b'm' => pi::MAINTAINER,
        b't' => pi::BUILD_TIME,
        b'c' => pi::REPO_COMMIT,
        b'r' => pi::REPLACES,
        b'k' => pi::PRIORITY,
        _ => 0,
    }
}

/// Decode a legacy checksum field: `Q1` + base64 of the raw digest, or a
/// plain hex string.
fn pull_checksum(text: &[u8]) -> Option<Vec<u8>> {
    if let Some(b64) = text.strip_prefix(b"Q1") {
        return BASE64.decode(b64).ok();
    }
    from_hex(text)
}

/// Write one package-info field from legacy text.
///
/// The unique id is the first 32 bits of the field's checksum; the repo
/// commit is a 40-character hex string stored as a 20-byte blob. Every
/// other field goes through its schema's normal from-string path.
pub fn write_field(db: &mut Database, ob: &mut ObjectBuilder, index: u16, text: &[u8]) -> Value {
    match index {
        pi::UNIQUE_ID => {
            let Some(csum) = pull_checksum(text).filter(|c| c.len() >= 4) else {
                return ob.set(index, Value::Error(ErrorCode::Format));
            };
            let id = u32::from_le_bytes([csum[0], csum[1], csum[2], csum[3]])
                & crate::db::value::VALUE_MASK;
            ob.set_int(db, index, id)
        }
        pi::REPO_COMMIT => {
            let Some(commit) = from_hex(text).filter(|c| c.len() == 20) else {
                return ob.set(index, Value::Error(ErrorCode::Format));
            };
            ob.set_blob(db, index, &commit)
        }
        _ => ob.set_from_string(db, index, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SchemaId;

    fn test_db() -> Database {
        Database::new(SchemaId::from_tag(*b"test"))
    }

    #[test]
    fn test_legacy_field_codes() {
        assert_eq!(field_index_for_tag(b'C'), pi::UNIQUE_ID);
        assert_eq!(field_index_for_tag(b'P'), pi::NAME);
        assert_eq!(field_index_for_tag(b'V'), pi::VERSION);
        assert_eq!(field_index_for_tag(b'k'), pi::PRIORITY);
        assert_eq!(field_index_for_tag(b'Z'), 0);
        assert_eq!(field_index_for_tag(b'@'), 0);
    }

    #[test]
    fn test_unique_id_from_hex_checksum() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
        write_field(&mut db, &mut ob, pi::UNIQUE_ID, b"deadbeef00112233");
        let v = ob.commit(&mut db);
        let obj = db.obj(&SCHEMA_PKGINFO, v).unwrap();
        let expect = u32::from_le_bytes([0xde, 0xad, 0xbe, 0xef]) & crate::db::value::VALUE_MASK;
        assert_eq!(obj.int(pi::UNIQUE_ID), expect);
    }

    #[test]
    fn test_unique_id_from_base64_checksum() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
        // "Q1" followed by base64 of 20 bytes of 0x01
        let encoded = format!("Q1{}", BASE64.encode([1u8; 20]));
        write_field(&mut db, &mut ob, pi::UNIQUE_ID, encoded.as_bytes());
        let v = ob.commit(&mut db);
        let obj = db.obj(&SCHEMA_PKGINFO, v).unwrap();
        assert_eq!(obj.int(pi::UNIQUE_ID), u32::from_le_bytes([1, 1, 1, 1]));
    }

    #[test]
    fn test_repo_commit_wants_40_hex_chars() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
        let hex = "0123456789abcdef0123456789abcdef01234567";
        write_field(&mut db, &mut ob, pi::REPO_COMMIT, hex.as_bytes());
        assert!(ob.error().is_none());
        let v = ob.commit(&mut db);
        let obj = db.obj(&SCHEMA_PKGINFO, v).unwrap();
        assert_eq!(obj.blob(pi::REPO_COMMIT).unwrap().len(), 20);

        let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
        write_field(&mut db, &mut ob, pi::REPO_COMMIT, b"abcd");
        assert_eq!(ob.error(), Some(ErrorCode::Format));
    }

    #[test]
    fn test_bad_checksum_taints_builder() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
        write_field(&mut db, &mut ob, pi::UNIQUE_ID, b"xy");
        assert_eq!(ob.error(), Some(ErrorCode::Format));
        assert!(ob.commit(&mut db).is_error());
    }

    #[test]
    fn test_ordering_cascades_to_unique_id() {
        let mut db = test_db();
        let mut build = |uid: u32| {
            let mut ob = ObjectBuilder::new(&SCHEMA_PKGINFO);
            ob.set_blob(&mut db, pi::NAME, b"pkg");
            ob.set_blob(&mut db, pi::VERSION, b"1.0");
            ob.set_int(&mut db, pi::UNIQUE_ID, uid);
            ob.commit(&mut db)
        };
        let a = build(10);
        let b = build(20);
        let oa = db.obj(&SCHEMA_PKGINFO, a).unwrap();
        let ob_ = db.obj(&SCHEMA_PKGINFO, b).unwrap();
        assert_eq!(pkginfo_cmp(oa, ob_), Ordering::Less);
        assert_eq!(pkginfo_cmp(ob_, oa), Ordering::Greater);
        assert_eq!(pkginfo_cmp(oa, oa), Ordering::Equal);
    }
}
