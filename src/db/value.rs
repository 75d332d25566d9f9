// src/db/value.rs

//! Tagged value handles
//!
//! Every field in a database reduces to a [`Value`]: an inline integer, an
//! index into one of the owning database's pools, or a sticky error. On
//! disk a value is a little-endian `u32` with the kind in the top four bits
//! and a 28-bit payload; in memory it is a plain sum type and the encoding
//! exists only at the serialization boundary.

/// Maximum payload representable inline in an encoded value.
pub const VALUE_MASK: u32 = 0x0fff_ffff;

/// Kind tags of the on-disk encoding.
pub const KIND_NULL: u32 = 0;
pub const KIND_ERROR: u32 = 1;
pub const KIND_INT: u32 = 2;
pub const KIND_INT32: u32 = 3;
pub const KIND_BLOB: u32 = 4;
pub const KIND_OBJECT: u32 = 5;
pub const KIND_ARRAY: u32 = 6;
pub const KIND_DB: u32 = 7;

/// Error kinds carried by [`Value::Error`]. The numeric codes are stable
/// and appear in encoded databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Structural violation of the binary layout or a schema parse
    Format = 1,
    /// Dependency expression failed to parse
    DepFormat = 2,
    /// URL did not parse
    BadUrl = 3,
    /// Incompatible version operators
    VersionConflict = 4,
    /// Stream canceled by a multipart callback
    Canceled = 5,
    /// Builder capacity exceeded
    Limit = 6,
}

impl ErrorCode {
    pub fn from_code(code: u32) -> Option<ErrorCode> {
        match code {
            1 => Some(ErrorCode::Format),
            2 => Some(ErrorCode::DepFormat),
            3 => Some(ErrorCode::BadUrl),
            4 => Some(ErrorCode::VersionConflict),
            5 => Some(ErrorCode::Canceled),
            6 => Some(ErrorCode::Limit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Format => "bad format",
            ErrorCode::DepFormat => "invalid dependency",
            ErrorCode::BadUrl => "bad URL",
            ErrorCode::VersionConflict => "version conflict",
            ErrorCode::Canceled => "canceled",
            ErrorCode::Limit => "too many entries",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handle to one logical node of a database.
///
/// Handles from the same database compare equal iff they refer to the same
/// logical content; the deduplicating pools guarantee this for blobs and
/// interned objects/arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    /// Sticky error; contaminates every write that consumes it
    Error(ErrorCode),
    /// Integer payload, stored inline or via the int pool when encoded
    Int(u32),
    /// Index into the blob pool
    Blob(u32),
    /// Index into the object pool
    Object(u32),
    /// Index into the array pool
    Array(u32),
    /// Index into the nested-database pool
    Db(u32),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(self) -> bool {
        self == Value::Null
    }

    pub fn is_error(self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The error carried by this value, if any.
    pub fn error(self) -> Option<ErrorCode> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for code in 1..=6 {
            let e = ErrorCode::from_code(code).unwrap();
            assert_eq!(e as u32, code);
        }
        assert!(ErrorCode::from_code(0).is_none());
        assert!(ErrorCode::from_code(99).is_none());
    }

    #[test]
    fn test_value_predicates() {
        assert!(Value::Null.is_null());
        assert!(Value::Error(ErrorCode::Format).is_error());
        assert_eq!(
            Value::Error(ErrorCode::DepFormat).error(),
            Some(ErrorCode::DepFormat)
        );
        assert_eq!(Value::Int(7).error(), None);
    }
}
