// src/packages/index.rs

//! Legacy textual index reader
//!
//! The classic index format is one `X:value` line per field with records
//! separated by blank lines, where `X` is a one-character field code.
//! Records become package-info objects; the result is an index database
//! whose packages array is sorted by (name, version, unique id).

use std::io::Read;

use crate::db::Database;
use crate::db::builder::{ArrayBuilder, ObjectBuilder};
use crate::error::{Error, Result};

use super::package::SCHEMA_INDEX;
use super::pkginfo::{SCHEMA_PKGINFO, SCHEMA_PKGINFO_ARRAY, field_index_for_tag, write_field};
use super::{SCHEMA_ID_INDEX, ndx};

/// Parse a legacy textual index. The repository description is carried
/// separately in legacy archives, so it arrives as a parameter.
///
/// Malformed field values surface as an error root value; only structural
/// problems (a line without a separator) fail the whole parse.
pub fn read_text_index(text: &[u8], description: Option<&[u8]>) -> Result<Database> {
    let mut db = Database::new(SCHEMA_ID_INDEX);
    let mut packages = ArrayBuilder::new(&SCHEMA_PKGINFO_ARRAY);
    let mut current: Option<ObjectBuilder> = None;

    for (lineno, line) in text.split(|&c| c == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            if let Some(ob) = current.take() {
                packages.append(ob.commit(&mut db));
            }
            continue;
        }
        if line.len() < 2 || line[1] != b':' {
            return Err(Error::BadFormat(format!(
                "index line {}: missing field separator",
                lineno + 1
            )));
        }
        let index = field_index_for_tag(line[0]);
        if index == 0 {
            continue;
        }
        let ob = current.get_or_insert_with(|| ObjectBuilder::new(&SCHEMA_PKGINFO));
        write_field(&mut db, ob, index, &line[2..]);
    }
    if let Some(ob) = current.take() {
        packages.append(ob.commit(&mut db));
    }

    let packages = packages.commit(&mut db);
    let mut root = ObjectBuilder::new(&SCHEMA_INDEX);
    if let Some(d) = description {
        root.set_blob(&mut db, ndx::DESCRIPTION, d);
    }
    root.set(ndx::PACKAGES, packages);
    let root = root.commit(&mut db);
    db.set_root(root);
    Ok(db)
}

/// Stream variant of [`read_text_index`].
pub fn read_text_index_stream(mut r: impl Read, description: Option<&[u8]>) -> Result<Database> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    read_text_index(&buf, description)
}

#[cfg(test)]
mod tests {
    use super::super::pi;
    use super::*;

    const SAMPLE: &[u8] = b"\
C:deadbeef00112233445566778899aabbccddeeff
P:zlib
V:1.3-r0
T:compression library
A:x86_64
L:Zlib
I:8192
S:4096
D:libc musl>=1.2

C:0011223344556677deadbeef8899aabbccddeeff
P:busybox
V:1.36.1-r5
T:size optimized toolbox
D:musl
";

    #[test]
    fn test_two_record_index_sorted_by_name() {
        let db = read_text_index(SAMPLE, Some(b"main")).unwrap();
        let root = db.obj(&SCHEMA_INDEX, db.root()).unwrap();
        assert_eq!(root.text(ndx::DESCRIPTION), Some("main"));
        let pkgs = root.arr(ndx::PACKAGES).unwrap();
        let names: Vec<&str> = pkgs.objs().filter_map(|p| p.text(pi::NAME)).collect();
        assert_eq!(names, vec!["busybox", "zlib"]);
    }

    #[test]
    fn test_fields_parse_through_schemas() {
        let db = read_text_index(SAMPLE, None).unwrap();
        let root = db.obj(&SCHEMA_INDEX, db.root()).unwrap();
        let pkgs = root.arr(ndx::PACKAGES).unwrap();
        let zlib = pkgs.objs().find(|p| p.text(pi::NAME) == Some("zlib")).unwrap();
        assert_eq!(zlib.text(pi::VERSION), Some("1.3-r0"));
        assert_eq!(zlib.int(pi::INSTALLED_SIZE), 8192);
        let deps = zlib.arr(pi::DEPENDS).unwrap();
        assert_eq!(deps.len(), 2);
        let uid = zlib.int(pi::UNIQUE_ID);
        let expect =
            u32::from_le_bytes([0xde, 0xad, 0xbe, 0xef]) & crate::db::value::VALUE_MASK;
        assert_eq!(uid, expect);
    }

    #[test]
    fn test_unknown_field_codes_are_ignored() {
        let db = read_text_index(b"P:foo\nV:1.0\nZ:whatever\n", None).unwrap();
        let root = db.obj(&SCHEMA_INDEX, db.root()).unwrap();
        let pkgs = root.arr(ndx::PACKAGES).unwrap();
        assert_eq!(pkgs.len(), 1);
    }

    #[test]
    fn test_missing_separator_is_structural() {
        assert!(matches!(
            read_text_index(b"P:foo\nbogus line\n", None),
            Err(Error::BadFormat(_))
        ));
    }

    #[test]
    fn test_bad_field_value_contaminates_root() {
        let db = read_text_index(b"P:foo\nI:notasize\n", None).unwrap();
        assert!(db.root().is_error());
    }

    #[test]
    fn test_empty_index() {
        let db = read_text_index(b"", None).unwrap();
        let root = db.obj(&SCHEMA_INDEX, db.root()).unwrap();
        let pkgs = root.arr(ndx::PACKAGES).unwrap();
        assert!(pkgs.is_empty());
    }

    #[test]
    fn test_round_trip_through_binary_form() {
        let db = read_text_index(SAMPLE, Some(b"main")).unwrap();
        let bytes = crate::db::format::to_vec(&db).unwrap();
        let loaded = crate::db::format::from_bytes(&bytes).unwrap();
        assert_eq!(
            super::super::compare_databases(&db, &loaded),
            Some(std::cmp::Ordering::Equal)
        );
        assert_eq!(crate::db::format::to_vec(&loaded).unwrap(), bytes);
    }

    #[test]
    fn test_dependency_canonical_rendering() {
        let db = read_text_index(b"P:foo\nV:1.0\nD:b   a , a\n", None).unwrap();
        let root = db.obj(&SCHEMA_INDEX, db.root()).unwrap();
        let pkgs = root.arr(ndx::PACKAGES).unwrap();
        let foo = pkgs.obj_at(0).unwrap();
        let deps = foo.arr(pi::DEPENDS).unwrap();
        let rendered: Vec<String> = deps
            .objs()
            .filter_map(super::super::dependency::dependency_tostring)
            .collect();
        assert_eq!(rendered, vec!["a", "b"]);
    }
}
