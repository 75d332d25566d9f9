// src/db/schema.rs

//! Schema metadata
//!
//! A schema describes how values of one entity are parsed, rendered,
//! compared and ordered. Schemas are pure metadata: they perform no I/O and
//! hold no reference to any particular database, so they live in immutable
//! `static` tables and every behavior receives the databases it operates on
//! as arguments.

use std::cmp::Ordering;

use super::builder::{ArrayBuilder, ObjectBuilder};
use super::value::{ErrorCode, Value};
use super::{Database, Obj};

/// Identifier bound to one top-level schema, stored in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub const fn from_tag(tag: [u8; 4]) -> SchemaId {
        SchemaId(u32::from_le_bytes(tag))
    }

    pub fn tag(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl Default for SchemaId {
    fn default() -> Self {
        SchemaId(0)
    }
}

/// Storage class of a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Blob,
}

/// Render a scalar to text. `limit` caps the output in bytes; a renderer
/// may fall back to a short form when the full rendering does not fit.
/// Returns `None` for null values.
pub type ScalarToString = fn(&Database, Value, usize) -> Option<String>;

/// Parse a scalar from text, interning into `db`. Failures come back as
/// error values, not as `Err`.
pub type ScalarFromString = fn(&mut Database, &[u8]) -> Value;

/// Total order over two scalars, each dereferenced in its own database.
pub type ScalarCompare = fn(&Database, Value, &Database, Value) -> Ordering;

/// Per-type behavior of a scalar field. Absent behaviors mean "not
/// convertible in this direction".
pub struct ScalarSchema {
    pub kind: ScalarKind,
    /// Printers may use multi-line rendering for this scalar
    pub multiline: bool,
    pub tostring: Option<ScalarToString>,
    pub fromstring: Option<ScalarFromString>,
    pub compare: Option<ScalarCompare>,
}

/// Total order over two committed objects.
pub type ObjCompare = fn(Obj<'_>, Obj<'_>) -> Ordering;

/// Render a whole object inline (e.g. a dependency expression).
pub type ObjToString = fn(Obj<'_>) -> Option<String>;

/// Parse a whole object from text into an open builder.
pub type ObjFromString =
    fn(&mut Database, &mut ObjectBuilder, &[u8]) -> Result<(), ErrorCode>;

/// Parse a list of elements from text into an open array builder.
pub type ArrFromString =
    fn(&mut Database, &mut ArrayBuilder, &[u8]) -> Result<(), ErrorCode>;

/// One named field of an object schema.
pub struct Field {
    pub index: u16,
    pub name: &'static str,
    pub schema: SchemaRef,
}

/// Layout of one object kind: a fixed field-index enumeration plus
/// optional whole-object behaviors.
pub struct ObjectSchema {
    /// One past the highest valid field index
    pub num_fields: u16,
    pub fields: &'static [Field],
    pub compare: Option<ObjCompare>,
    pub tostring: Option<ObjToString>,
    pub fromstring: Option<ObjFromString>,
    /// Default integer per field index; committed objects elide fields
    /// equal to their default
    pub default_int: Option<fn(u16) -> Option<u32>>,
}

impl ObjectSchema {
    pub fn field(&'static self, index: u16) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.index == index)
    }

    pub fn field_by_name(&'static self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn default_int(&self, index: u16) -> Option<u32> {
        self.default_int.and_then(|f| f(index))
    }
}

/// Transform applied exactly once when an array builder is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCommit {
    /// Stable sort by the element schema's compare
    Sort,
    /// Sort, then collapse adjacent equal elements
    SortUnique,
}

/// Layout of one array kind.
pub struct ArraySchema {
    pub element: SchemaRef,
    pub max_items: u32,
    pub pre_commit: Option<PreCommit>,
    pub fromstring: Option<ArrFromString>,
}

/// Sentinel marking a field that serializes as an independently
/// addressable sub-database with its own magic.
pub struct NestedSchema {
    pub schema_id: SchemaId,
    pub schema: &'static ObjectSchema,
}

/// Reference to any schema node.
#[derive(Clone, Copy)]
pub enum SchemaRef {
    Scalar(&'static ScalarSchema),
    Object(&'static ObjectSchema),
    Array(&'static ArraySchema),
    Nested(&'static NestedSchema),
}

impl SchemaRef {
    /// The object schema behind this reference, unwrapping the nested-db
    /// sentinel.
    pub fn object_schema(self) -> Option<&'static ObjectSchema> {
        match self {
            SchemaRef::Object(s) => Some(s),
            SchemaRef::Nested(s) => Some(s.schema),
            _ => None,
        }
    }

    /// Total order over two values of this schema, each dereferenced in
    /// its own pool. Null sorts first; errors sort last.
    pub fn compare_values(
        self,
        db1: &Database,
        v1: Value,
        db2: &Database,
        v2: Value,
    ) -> Ordering {
        match (v1, v2) {
            (Value::Error(_), Value::Error(_)) => return Ordering::Equal,
            (Value::Error(_), _) => return Ordering::Greater,
            (_, Value::Error(_)) => return Ordering::Less,
            _ => {}
        }
        match self {
            SchemaRef::Scalar(s) => match s.compare {
                Some(cmp) => cmp(db1, v1, db2, v2),
                None => Ordering::Equal,
            },
            SchemaRef::Object(s) => compare_objects(s, db1, v1, db2, v2),
            SchemaRef::Nested(s) => compare_objects(s.schema, db1, v1, db2, v2),
            SchemaRef::Array(s) => {
                let a1 = db1.arr(s, v1);
                let a2 = db2.arr(s, v2);
                match (a1, a2) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(a1), Some(a2)) => {
                        for (x, y) in a1.iter().zip(a2.iter()) {
                            let r = s.element.compare_values(db1, x, db2, y);
                            if r != Ordering::Equal {
                                return r;
                            }
                        }
                        a1.len().cmp(&a2.len())
                    }
                }
            }
        }
    }
}

fn compare_objects(
    schema: &'static ObjectSchema,
    db1: &Database,
    v1: Value,
    db2: &Database,
    v2: Value,
) -> Ordering {
    match (db1.obj(schema, v1), db2.obj(schema, v2)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(o1), Some(o2)) => match schema.compare {
            Some(cmp) => cmp(o1, o2),
            None => {
                // No dedicated comparator: cascade over fields in index
                // order.
                for f in schema.fields {
                    let r = o1.cmp_field(&o2, f.index);
                    if r != Ordering::Equal {
                        return r;
                    }
                }
                Ordering::Equal
            }
        },
    }
}
