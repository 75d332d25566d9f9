// src/packages/dependency.rs

//! Dependency expressions
//!
//! The textual form of one dependency is `[!]name[OP...ver][@tag]` where
//! each OP is one of `<`, `>`, `~`, `=`. Lists split on runs of whitespace
//! or commas and commit sorted and deduplicated by name.

use std::cmp::Ordering;

use crate::db::builder::{ArrayBuilder, ObjectBuilder};
use crate::db::schema::{
    ArraySchema, Field, ObjectSchema, PreCommit, SchemaId, SchemaRef,
};
use crate::db::value::ErrorCode;
use crate::db::{Database, Obj};
use crate::error::{Error, Result};
use crate::version::{self, Match};

use super::dep;
use super::scalars::{SCALAR_INT, SCALAR_STRING, SCALAR_VERSION};

fn is_comparer(c: u8) -> bool {
    matches!(c, b'<' | b'>' | b'~' | b'=')
}

fn is_separator(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b',')
}

/// Parse one dependency expression into an open object builder.
pub fn dependency_fromstring(
    db: &mut Database,
    ob: &mut ObjectBuilder,
    text: &[u8],
) -> std::result::Result<(), ErrorCode> {
    let mut t = text;
    let mut mask = Match::ANY;
    if t.first() == Some(&b'!') {
        t = &t[1..];
        mask |= Match::CONFLICT;
    }

    let mut name = t;
    let mut ver: Option<&[u8]> = None;
    if let Some(pos) = t.iter().position(|&c| is_comparer(c)) {
        let opend = pos + t[pos..].iter().take_while(|&&c| is_comparer(c)).count();
        let ops = &t[pos..opend];
        let rest = &t[opend..];
        if rest.is_empty() {
            return Err(ErrorCode::DepFormat);
        }
        let mut ops_mask = Match::empty();
        for &c in ops {
            match c {
                b'<' => ops_mask |= Match::LESS,
                b'>' => ops_mask |= Match::GREATER,
                b'~' => ops_mask |= Match::FUZZY | Match::EQUAL,
                b'=' => ops_mask |= Match::EQUAL,
                _ => unreachable!(),
            }
        }
        if !ops_mask.contains(Match::CHECKSUM) && !version::validate(rest) {
            return Err(ErrorCode::DepFormat);
        }
        mask = ops_mask | (mask & Match::CONFLICT);
        name = &t[..pos];
        ver = Some(rest);
    }

    // Trailing @tag scopes the dependency to a repository tag.
    if let Some(at) = name.iter().position(|&c| c == b'@') {
        name = &name[..at];
    }
    if name.is_empty() {
        return Err(ErrorCode::DepFormat);
    }

    ob.set_blob(db, dep::NAME, name);
    if mask != Match::ANY {
        if let Some(v) = ver {
            ob.set_blob(db, dep::VERSION, v);
        }
        if mask != Match::EQUAL {
            ob.set_int(db, dep::MATCH, mask.bits());
        }
    }
    Ok(())
}

/// Render one dependency; inverts the parsing rules exactly.
pub fn dependency_tostring(obj: Obj<'_>) -> Option<String> {
    let name = obj.blob(dep::NAME)?;
    let name = String::from_utf8_lossy(name);
    let mask = match obj.int(dep::MATCH) {
        0 => Match::EQUAL,
        bits => Match::from_bits_truncate(bits),
    };
    let bang = if mask.contains(Match::CONFLICT) { "!" } else { "" };
    match obj.blob(dep::VERSION) {
        None => Some(format!("{bang}{name}")),
        Some(ver) => Some(format!(
            "{bang}{name}{}{}",
            mask.op_string(),
            String::from_utf8_lossy(ver)
        )),
    }
}

fn dependency_cmp(o1: Obj<'_>, o2: Obj<'_>) -> Ordering {
    o1.cmp_field(&o2, dep::NAME)
}

pub static SCHEMA_DEPENDENCY: ObjectSchema = ObjectSchema {
    num_fields: dep::MAX,
    fields: &[
        Field {
            index: dep::NAME,
            name: "name",
            schema: SchemaRef::Scalar(&SCALAR_STRING),
        },
        Field {
            index: dep::VERSION,
            name: "version",
            schema: SchemaRef::Scalar(&SCALAR_VERSION),
        },
        Field {
            index: dep::MATCH,
            name: "match",
            schema: SchemaRef::Scalar(&SCALAR_INT),
        },
    ],
    compare: Some(dependency_cmp),
    tostring: Some(dependency_tostring),
    fromstring: Some(dependency_fromstring),
    default_int: None,
};

/// Fold a whole dependency list into an open array builder.
pub fn dependencies_fromstring(
    db: &mut Database,
    ab: &mut ArrayBuilder,
    text: &[u8],
) -> std::result::Result<(), ErrorCode> {
    for part in text.split(|&c| is_separator(c)) {
        if part.is_empty() {
            continue;
        }
        ab.append_from_string(db, part);
    }
    Ok(())
}

pub static SCHEMA_DEPENDENCY_ARRAY: ArraySchema = ArraySchema {
    element: SchemaRef::Object(&SCHEMA_DEPENDENCY),
    max_items: super::MAX_PKG_DEPENDENCIES,
    pre_commit: Some(PreCommit::SortUnique),
    fromstring: Some(dependencies_fromstring),
};

/// A dependency detached from any database, for driving queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub mask: Match,
}

impl Dependency {
    /// Parse through the schema machinery, so the CLI and the database
    /// agree on the grammar.
    pub fn parse(text: &str) -> Result<Dependency> {
        let mut db = Database::new(SchemaId(0));
        let mut ob = ObjectBuilder::new(&SCHEMA_DEPENDENCY);
        dependency_fromstring(&mut db, &mut ob, text.as_bytes())
            .map_err(|_| Error::DepFormat(text.to_string()))?;
        let v = ob.commit(&mut db);
        let obj = db
            .obj(&SCHEMA_DEPENDENCY, v)
            .ok_or_else(|| Error::DepFormat(text.to_string()))?;
        Dependency::from_obj(obj).ok_or_else(|| Error::DepFormat(text.to_string()))
    }

    /// Lift a committed dependency object out of its database.
    pub fn from_obj(obj: Obj<'_>) -> Option<Dependency> {
        let name = obj.text(dep::NAME)?.to_string();
        let version = obj.text(dep::VERSION).map(str::to_string);
        let mask = match obj.int(dep::MATCH) {
            0 if version.is_some() => Match::EQUAL,
            0 => Match::ANY,
            bits => Match::from_bits_truncate(bits),
        };
        Some(Dependency {
            name,
            version,
            mask,
        })
    }

    /// Whether an installed `(name, version)` satisfies this dependency.
    /// A conflict dependency is satisfied by the package being absent, so
    /// a present match inverts. A checksum constraint cannot be reconciled
    /// with version comparison and reports a version conflict.
    pub fn is_satisfied_by(&self, name: &str, version: &[u8]) -> Result<bool> {
        if self.name != name {
            return Ok(false);
        }
        let ok = match &self.version {
            None => true,
            Some(v) => {
                let ops = self.mask.intersection(Match::ANY | Match::FUZZY);
                if ops == Match::CHECKSUM {
                    return Err(Error::VersionConflict(self.to_string()));
                }
                version::version_match(version, self.mask, v.as_bytes())
            }
        };
        Ok(if self.mask.contains(Match::CONFLICT) {
            !ok
        } else {
            ok
        })
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.mask.contains(Match::CONFLICT) {
            write!(f, "!")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(v) = &self.version {
            write!(f, "{}{v}", self.mask.op_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::builder::ArrayBuilder;
    use crate::db::value::Value;

    fn parse_one(db: &mut Database, text: &[u8]) -> Value {
        let mut ob = ObjectBuilder::new(&SCHEMA_DEPENDENCY);
        match dependency_fromstring(db, &mut ob, text) {
            Ok(()) => ob.commit(db),
            Err(e) => Value::Error(e),
        }
    }

    fn render(db: &Database, v: Value) -> String {
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        dependency_tostring(obj).unwrap()
    }

    fn test_db() -> Database {
        Database::new(SchemaId::from_tag(*b"test"))
    }

    #[test]
    fn test_parse_conflict_with_operator() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"!foo>=1.2.3-r4");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::NAME), Some("foo"));
        assert_eq!(obj.text(dep::VERSION), Some("1.2.3-r4"));
        assert_eq!(
            Match::from_bits_truncate(obj.int(dep::MATCH)),
            Match::CONFLICT | Match::GREATER | Match::EQUAL
        );
        assert_eq!(render(&db, v), "!foo>=1.2.3-r4");
    }

    #[test]
    fn test_parse_plain_name() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"busybox");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::NAME), Some("busybox"));
        assert!(obj.val(dep::VERSION).is_null());
        assert!(obj.val(dep::MATCH).is_null());
        assert_eq!(render(&db, v), "busybox");
    }

    #[test]
    fn test_equal_operator_elides_match_field() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"foo=1.0");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::VERSION), Some("1.0"));
        assert!(obj.val(dep::MATCH).is_null());
        assert_eq!(render(&db, v), "foo=1.0");
    }

    #[test]
    fn test_bare_conflict() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"!foo");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::NAME), Some("foo"));
        assert!(obj.val(dep::VERSION).is_null());
        assert_eq!(
            Match::from_bits_truncate(obj.int(dep::MATCH)),
            Match::CONFLICT | Match::ANY
        );
        assert_eq!(render(&db, v), "!foo");
    }

    #[test]
    fn test_fuzzy_operator() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"c~2.0");
        assert_eq!(render(&db, v), "c~2.0");
    }

    #[test]
    fn test_invalid_version_rejected() {
        let mut db = test_db();
        assert_eq!(
            parse_one(&mut db, b"foo>=not-a-version"),
            Value::Error(ErrorCode::DepFormat)
        );
        assert_eq!(parse_one(&mut db, b"foo>="), Value::Error(ErrorCode::DepFormat));
        assert_eq!(parse_one(&mut db, b">=1.0"), Value::Error(ErrorCode::DepFormat));
    }

    #[test]
    fn test_checksum_dependency_skips_validation() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"foo><abcdef");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::VERSION), Some("abcdef"));
        assert_eq!(
            Match::from_bits_truncate(obj.int(dep::MATCH)),
            Match::CHECKSUM
        );
    }

    #[test]
    fn test_repository_tag_is_stripped() {
        let mut db = test_db();
        let v = parse_one(&mut db, b"foo@edge");
        let obj = db.obj(&SCHEMA_DEPENDENCY, v).unwrap();
        assert_eq!(obj.text(dep::NAME), Some("foo"));
    }

    #[test]
    fn test_list_sorts_and_dedups() {
        let mut db = test_db();
        let mut ab = ArrayBuilder::new(&SCHEMA_DEPENDENCY_ARRAY);
        dependencies_fromstring(&mut db, &mut ab, b"a>1  b , c~2.0 b").unwrap();
        let v = ab.commit(&mut db);
        let arr = db.arr(&SCHEMA_DEPENDENCY_ARRAY, v).unwrap();
        let rendered: Vec<String> = arr
            .objs()
            .map(|o| dependency_tostring(o).unwrap())
            .collect();
        assert_eq!(rendered, vec!["a>1", "b", "c~2.0"]);
    }

    #[test]
    fn test_list_error_propagates() {
        let mut db = test_db();
        let mut ab = ArrayBuilder::new(&SCHEMA_DEPENDENCY_ARRAY);
        dependencies_fromstring(&mut db, &mut ab, b"good bad>=!").unwrap();
        assert!(ab.commit(&mut db).is_error());
    }

    #[test]
    fn test_detached_dependency_round_trip() {
        let d = Dependency::parse("!foo>=1.2.3-r4").unwrap();
        assert_eq!(d.name, "foo");
        assert_eq!(d.version.as_deref(), Some("1.2.3-r4"));
        assert_eq!(d.to_string(), "!foo>=1.2.3-r4");
        assert!(Dependency::parse("foo>=").is_err());
    }

    #[test]
    fn test_satisfaction() {
        let d = Dependency::parse("foo>=1.2").unwrap();
        assert!(d.is_satisfied_by("foo", b"1.3").unwrap());
        assert!(!d.is_satisfied_by("foo", b"1.1").unwrap());
        assert!(!d.is_satisfied_by("bar", b"1.3").unwrap());

        let c = Dependency::parse("!foo").unwrap();
        assert!(!c.is_satisfied_by("foo", b"1.0").unwrap());
    }

    #[test]
    fn test_checksum_constraint_reports_version_conflict() {
        let d = Dependency::parse("foo><abcdef").unwrap();
        assert!(matches!(
            d.is_satisfied_by("foo", b"1.0"),
            Err(Error::VersionConflict(_))
        ));
    }
}
