// src/db/builder.rs

//! Object and array writers
//!
//! Builders accumulate typed values against a schema and intern the result
//! into the owning database on commit. Errors are sticky: once a builder
//! consumes an error value, its commit returns an error handle carrying
//! the first error seen.

use std::cmp::Ordering;

use super::Database;
use super::schema::{ArraySchema, ObjectSchema, PreCommit, SchemaRef};
use super::value::{ErrorCode, Value};

/// Writer for one object. Field assignment is last-write-wins; commit
/// stores fields in index order and drops entries equal to the field's
/// default.
pub struct ObjectBuilder {
    schema: &'static ObjectSchema,
    fields: Vec<Value>,
    error: Option<ErrorCode>,
}

impl ObjectBuilder {
    pub fn new(schema: &'static ObjectSchema) -> Self {
        ObjectBuilder {
            schema,
            fields: vec![Value::Null; schema.num_fields as usize],
            error: None,
        }
    }

    pub fn schema(&self) -> &'static ObjectSchema {
        self.schema
    }

    /// First error consumed by this builder, if any.
    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    fn taint(&mut self, e: ErrorCode) -> Value {
        if self.error.is_none() {
            self.error = Some(e);
        }
        Value::Error(e)
    }

    /// Assign a field. Out-of-range indices and error values taint the
    /// builder.
    pub fn set(&mut self, index: u16, v: Value) -> Value {
        if index == 0 || index >= self.schema.num_fields {
            return self.taint(ErrorCode::Format);
        }
        if let Value::Error(e) = v {
            return self.taint(e);
        }
        self.fields[index as usize] = v;
        v
    }

    pub fn set_int(&mut self, db: &mut Database, index: u16, n: u32) -> Value {
        let v = db.w_int(n);
        self.set(index, v)
    }

    pub fn set_blob(&mut self, db: &mut Database, index: u16, bytes: &[u8]) -> Value {
        let v = db.w_blob(bytes);
        self.set(index, v)
    }

    /// Assign a field by invoking its schema's from-string behavior.
    pub fn set_from_string(&mut self, db: &mut Database, index: u16, text: &[u8]) -> Value {
        let Some(field) = self.schema.field(index) else {
            return self.taint(ErrorCode::Format);
        };
        let v = value_from_string(db, field.schema, text);
        self.set(index, v)
    }

    /// Finalize: sort fields by index, elide defaults, intern.
    pub fn commit(self, db: &mut Database) -> Value {
        if let Some(e) = self.error {
            return Value::Error(e);
        }
        let mut out = Vec::new();
        for (i, &v) in self.fields.iter().enumerate().skip(1) {
            let index = i as u16;
            match v {
                Value::Null => {}
                Value::Int(n) if self.schema.default_int(index) == Some(n) => {}
                _ => out.push((index, v)),
            }
        }
        db.intern_object(out)
    }
}

/// Writer for one array.
pub struct ArrayBuilder {
    schema: &'static ArraySchema,
    items: Vec<Value>,
    error: Option<ErrorCode>,
}

impl ArrayBuilder {
    pub fn new(schema: &'static ArraySchema) -> Self {
        ArrayBuilder {
            schema,
            items: Vec::new(),
            error: None,
        }
    }

    pub fn schema(&self) -> &'static ArraySchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    fn taint(&mut self, e: ErrorCode) -> Value {
        if self.error.is_none() {
            self.error = Some(e);
        }
        Value::Error(e)
    }

    /// Append one committed element.
    pub fn append(&mut self, v: Value) -> Value {
        if let Value::Error(e) = v {
            return self.taint(e);
        }
        if self.items.len() as u32 >= self.schema.max_items {
            return self.taint(ErrorCode::Limit);
        }
        self.items.push(v);
        v
    }

    /// Parse one element from text and append it.
    pub fn append_from_string(&mut self, db: &mut Database, text: &[u8]) -> Value {
        let v = value_from_string(db, self.schema.element, text);
        self.append(v)
    }

    /// Finalize: run the pre-commit hook, then intern. The hook runs
    /// exactly once and is idempotent.
    pub fn commit(self, db: &mut Database) -> Value {
        if let Some(e) = self.error {
            return Value::Error(e);
        }
        let mut items = self.items;
        let element = self.schema.element;
        match self.schema.pre_commit {
            Some(PreCommit::Sort) => {
                let dbr: &Database = db;
                items.sort_by(|a, b| element.compare_values(dbr, *a, dbr, *b));
            }
            Some(PreCommit::SortUnique) => {
                let dbr: &Database = db;
                items.sort_by(|a, b| element.compare_values(dbr, *a, dbr, *b));
                items.dedup_by(|a, b| {
                    element.compare_values(dbr, *a, dbr, *b) == Ordering::Equal
                });
            }
            None => {}
        }
        db.intern_array(items)
    }
}

/// Parse a value of any schema from text.
fn value_from_string(db: &mut Database, schema: SchemaRef, text: &[u8]) -> Value {
    match schema {
        SchemaRef::Scalar(s) => match s.fromstring {
            Some(f) => f(db, text),
            None => Value::Error(ErrorCode::Format),
        },
        SchemaRef::Object(s) => object_from_string(db, s, text),
        SchemaRef::Nested(n) => object_from_string(db, n.schema, text),
        SchemaRef::Array(s) => match s.fromstring {
            Some(f) => {
                let mut ab = ArrayBuilder::new(s);
                match f(db, &mut ab, text) {
                    Ok(()) => ab.commit(db),
                    Err(e) => Value::Error(e),
                }
            }
            None => Value::Error(ErrorCode::Format),
        },
    }
}

fn object_from_string(db: &mut Database, schema: &'static ObjectSchema, text: &[u8]) -> Value {
    match schema.fromstring {
        Some(f) => {
            let mut ob = ObjectBuilder::new(schema);
            match f(db, &mut ob, text) {
                Ok(()) => ob.commit(db),
                Err(e) => Value::Error(e),
            }
        }
        None => Value::Error(ErrorCode::Format),
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema::{Field, ScalarKind, ScalarSchema, SchemaId};
    use super::*;

    fn blob_compare(
        db1: &Database,
        v1: Value,
        db2: &Database,
        v2: Value,
    ) -> Ordering {
        db1.r_blob(v1).cmp(&db2.r_blob(v2))
    }

    static SCALAR: ScalarSchema = ScalarSchema {
        kind: ScalarKind::Blob,
        multiline: false,
        tostring: None,
        fromstring: None,
        compare: Some(blob_compare),
    };

    fn default_two(index: u16) -> Option<u32> {
        if index == 2 { Some(7) } else { None }
    }

    static OBJ: ObjectSchema = ObjectSchema {
        num_fields: 3,
        fields: &[
            Field {
                index: 1,
                name: "value",
                schema: SchemaRef::Scalar(&SCALAR),
            },
            Field {
                index: 2,
                name: "count",
                schema: SchemaRef::Scalar(&SCALAR),
            },
        ],
        compare: None,
        tostring: None,
        fromstring: None,
        default_int: Some(default_two),
    };

    static SORTED: ArraySchema = ArraySchema {
        element: SchemaRef::Scalar(&SCALAR),
        max_items: 4,
        pre_commit: Some(PreCommit::SortUnique),
        fromstring: None,
    };

    fn test_db() -> Database {
        Database::new(SchemaId::from_tag(*b"test"))
    }

    #[test]
    fn test_last_write_wins() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&OBJ);
        ob.set_blob(&mut db, 1, b"first");
        ob.set_blob(&mut db, 1, b"second");
        let v = ob.commit(&mut db);
        let obj = db.obj(&OBJ, v).unwrap();
        assert_eq!(obj.blob(1), Some(&b"second"[..]));
    }

    #[test]
    fn test_out_of_range_index_taints() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&OBJ);
        assert!(ob.set(0, Value::Int(1)).is_error());
        assert!(ob.commit(&mut db).is_error());

        let mut ob = ObjectBuilder::new(&OBJ);
        assert!(ob.set(99, Value::Int(1)).is_error());
        assert_eq!(ob.error(), Some(ErrorCode::Format));
    }

    #[test]
    fn test_first_error_wins() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&OBJ);
        ob.set(1, Value::Error(ErrorCode::DepFormat));
        ob.set(1, Value::Error(ErrorCode::Limit));
        assert_eq!(ob.commit(&mut db), Value::Error(ErrorCode::DepFormat));
    }

    #[test]
    fn test_default_int_elided() {
        let mut db = test_db();
        let mut ob = ObjectBuilder::new(&OBJ);
        ob.set_int(&mut db, 2, 7);
        let v = ob.commit(&mut db);
        let obj = db.obj(&OBJ, v).unwrap();
        assert!(obj.val(2).is_null());
        assert_eq!(obj.int(2), 7);
    }

    #[test]
    fn test_array_capacity_limit() {
        let mut db = test_db();
        let mut ab = ArrayBuilder::new(&SORTED);
        for i in 0..4 {
            let v = db.w_blob(format!("item{i}").as_bytes());
            ab.append(v);
        }
        let v = db.w_blob(b"overflow");
        assert_eq!(ab.append(v), Value::Error(ErrorCode::Limit));
        assert!(ab.commit(&mut db).is_error());
    }

    #[test]
    fn test_sort_unique_collapses_equals() {
        let mut db = test_db();
        let b = db.w_blob(b"b");
        let a = db.w_blob(b"a");
        let mut ab = ArrayBuilder::new(&SORTED);
        ab.append(b);
        ab.append(a);
        ab.append(b);
        let v = ab.commit(&mut db);
        let arr = db.arr(&SORTED, v).unwrap();
        let items: Vec<Value> = arr.iter().collect();
        assert_eq!(items, vec![a, b]);
    }

    #[test]
    fn test_identical_commits_intern_to_one_object() {
        let mut db = test_db();
        let build = |db: &mut Database| {
            let mut ob = ObjectBuilder::new(&OBJ);
            ob.set_blob(db, 1, b"same");
            ob.commit(db)
        };
        let v1 = build(&mut db);
        let v2 = build(&mut db);
        assert_eq!(v1, v2);
    }
}
