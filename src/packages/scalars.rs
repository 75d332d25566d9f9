// src/packages/scalars.rs

//! Scalar converters
//!
//! The text and ordering behaviors every domain field plugs in: plain and
//! multiline strings, versions, decimal and octal integers, human-readable
//! sizes, and hex-rendered blobs.

use std::cmp::Ordering;

use crate::db::Database;
use crate::db::schema::{ScalarKind, ScalarSchema};
use crate::db::value::{ErrorCode, Value};
use crate::version;

fn string_tostring(db: &Database, v: Value, _limit: usize) -> Option<String> {
    db.r_blob(v).map(|b| String::from_utf8_lossy(b).into_owned())
}

fn string_fromstring(db: &mut Database, text: &[u8]) -> Value {
    db.w_blob(text)
}

fn blob_cmp(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

fn string_compare(db1: &Database, v1: Value, db2: &Database, v2: Value) -> Ordering {
    blob_cmp(db1.r_blob(v1), db2.r_blob(v2))
}

pub static SCALAR_STRING: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: false,
    tostring: Some(string_tostring),
    fromstring: Some(string_fromstring),
    compare: Some(string_compare),
};

pub static SCALAR_MSTRING: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: true,
    tostring: Some(string_tostring),
    fromstring: Some(string_fromstring),
    compare: Some(string_compare),
};

fn version_compare(db1: &Database, v1: Value, db2: &Database, v2: Value) -> Ordering {
    match (db1.r_blob(v1), db2.r_blob(v2)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => version::compare(a, b),
    }
}

/// Versions are stored raw; the domain-specific ordering lives entirely in
/// the comparator. Validation happens where dependencies are parsed.
pub static SCALAR_VERSION: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: false,
    tostring: Some(string_tostring),
    fromstring: Some(string_fromstring),
    compare: Some(version_compare),
};

fn int_tostring(db: &Database, v: Value, _limit: usize) -> Option<String> {
    db.r_int(v).map(|n| n.to_string())
}

fn int_fromstring(db: &mut Database, text: &[u8]) -> Value {
    if text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return Value::Error(ErrorCode::Format);
    }
    match std::str::from_utf8(text).ok().and_then(|s| s.parse::<u32>().ok()) {
        Some(n) => db.w_int(n),
        None => Value::Error(ErrorCode::Format),
    }
}

fn int_compare(db1: &Database, v1: Value, db2: &Database, v2: Value) -> Ordering {
    let a = db1.r_int(v1).unwrap_or(0);
    let b = db2.r_int(v2).unwrap_or(0);
    a.cmp(&b)
}

pub static SCALAR_INT: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Int,
    multiline: false,
    tostring: Some(int_tostring),
    fromstring: Some(int_fromstring),
    compare: Some(int_compare),
};

fn oct_tostring(db: &Database, v: Value, _limit: usize) -> Option<String> {
    db.r_int(v).map(|n| format!("{n:o}"))
}

/// Unix mode bits: render-only, base 8.
pub static SCALAR_OCT: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Int,
    multiline: false,
    tostring: Some(oct_tostring),
    fromstring: None,
    compare: None,
};

/// Scale a byte count down to the largest unit it fills.
pub fn human_size(size: u64) -> (u64, &'static str) {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut v = size;
    let mut i = 0;
    while v >= 1024 && i + 1 < UNITS.len() {
        v /= 1024;
        i += 1;
    }
    (v, UNITS[i])
}

fn hsize_tostring(db: &Database, v: Value, _limit: usize) -> Option<String> {
    let (v, unit) = human_size(db.r_int(v)? as u64);
    Some(format!("{v} {unit}"))
}

pub static SCALAR_HSIZE: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Int,
    multiline: false,
    tostring: Some(hsize_tostring),
    fromstring: Some(int_fromstring),
    compare: Some(int_compare),
};

fn hexblob_tostring(db: &Database, v: Value, limit: usize) -> Option<String> {
    let b = db.r_blob(v)?;
    if b.len().saturating_mul(2) > limit {
        return Some(format!("({} bytes)", b.len()));
    }
    Some(to_hex(b))
}

/// Raw bytes rendered as hex, with a short fallback when the rendering
/// does not fit the output limit.
pub static SCALAR_HEXBLOB: ScalarSchema = ScalarSchema {
    kind: ScalarKind::Blob,
    multiline: false,
    tostring: Some(hexblob_tostring),
    fromstring: None,
    compare: Some(string_compare),
};

pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

pub fn from_hex(text: &[u8]) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    let nibble = |c: u8| -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    };
    text.chunks(2)
        .map(|p| Some(nibble(p[0])? << 4 | nibble(p[1])?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SchemaId;

    fn test_db() -> Database {
        Database::new(SchemaId::from_tag(*b"test"))
    }

    #[test]
    fn test_int_parse_rejects_garbage() {
        let mut db = test_db();
        assert_eq!(int_fromstring(&mut db, b"1234"), Value::Int(1234));
        assert!(int_fromstring(&mut db, b"12x").is_error());
        assert!(int_fromstring(&mut db, b"").is_error());
        assert!(int_fromstring(&mut db, b"+5").is_error());
        assert!(int_fromstring(&mut db, b"99999999999").is_error());
    }

    #[test]
    fn test_oct_render() {
        let mut db = test_db();
        let v = db.w_int(0o755);
        assert_eq!(oct_tostring(&db, v, usize::MAX), Some("755".to_string()));
    }

    #[test]
    fn test_hsize_scale_table() {
        assert_eq!(human_size(0), (0, "B"));
        assert_eq!(human_size(1023), (1023, "B"));
        assert_eq!(human_size(4096), (4, "KiB"));
        assert_eq!(human_size(1_048_576), (1, "MiB"));
    }

    #[test]
    fn test_hsize_render() {
        let mut db = test_db();
        let v = db.w_int(1_048_576);
        assert_eq!(hsize_tostring(&db, v, usize::MAX), Some("1 MiB".to_string()));
    }

    #[test]
    fn test_hexblob_render_and_fallback() {
        let mut db = test_db();
        let v = db.w_blob(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            hexblob_tostring(&db, v, usize::MAX),
            Some("deadbeef".to_string())
        );
        assert_eq!(hexblob_tostring(&db, v, 3), Some("(4 bytes)".to_string()));
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(from_hex(b"deadbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(to_hex(&[0x01, 0xff]), "01ff");
        assert_eq!(from_hex(b"abc"), None);
        assert_eq!(from_hex(b"zz"), None);
    }

    #[test]
    fn test_version_scalar_ordering() {
        let mut db = test_db();
        let a = db.w_blob(b"1.2.3");
        let b = db.w_blob(b"1.2.3-r1");
        assert_eq!(version_compare(&db, a, &db, b), Ordering::Less);
        assert_eq!(version_compare(&db, b, &db, a), Ordering::Greater);
        assert_eq!(version_compare(&db, a, &db, a), Ordering::Equal);
    }
}
