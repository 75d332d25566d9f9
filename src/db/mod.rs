// src/db/mod.rs

//! The database container
//!
//! A [`Database`] owns four content-addressed pools (ints, blobs, objects,
//! arrays) plus a pool of nested sub-databases, and a root value pointing
//! at one top-level schema. Identical blobs, integers, committed objects
//! and committed arrays intern to a single slot, so handle equality within
//! one database follows content equality.
//!
//! All mutation goes through [`builder::ObjectBuilder`] and
//! [`builder::ArrayBuilder`]; a database is single-threaded while being
//! built and freely shareable for read-only traversal afterwards.

pub mod builder;
pub mod dump;
pub mod format;
pub mod schema;
pub mod value;

use std::cmp::Ordering;
use std::collections::HashMap;

use schema::{ArraySchema, ObjectSchema, SchemaId, SchemaRef};
use value::{VALUE_MASK, Value};

/// An owning pool of values rooted at one top-level schema.
#[derive(Debug, Default)]
pub struct Database {
    schema_id: SchemaId,
    root: Value,

    ints: Vec<u32>,
    blobs: Vec<Vec<u8>>,
    objects: Vec<Vec<(u16, Value)>>,
    arrays: Vec<Vec<Value>>,
    nested: Vec<Database>,

    int_index: HashMap<u32, u32>,
    blob_index: HashMap<Vec<u8>, u32>,
    object_index: HashMap<Vec<(u16, Value)>, u32>,
    array_index: HashMap<Vec<Value>, u32>,
}

impl Database {
    /// Create an empty database bound to a top-level schema id.
    pub fn new(schema_id: SchemaId) -> Self {
        Database {
            schema_id,
            ..Database::default()
        }
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    pub fn root(&self) -> Value {
        self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// Number of distinct blobs interned so far.
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Write an integer value. Values too wide for the inline encoding are
    /// interned into the int pool so serialization can reference them.
    pub fn w_int(&mut self, v: u32) -> Value {
        if v > VALUE_MASK && !self.int_index.contains_key(&v) {
            let slot = self.ints.len() as u32;
            self.ints.push(v);
            self.int_index.insert(v, slot);
        }
        Value::Int(v)
    }

    /// Intern a blob, deduplicating on content.
    pub fn w_blob(&mut self, bytes: &[u8]) -> Value {
        if let Some(&slot) = self.blob_index.get(bytes) {
            return Value::Blob(slot);
        }
        let slot = self.blobs.len() as u32;
        self.blobs.push(bytes.to_vec());
        self.blob_index.insert(bytes.to_vec(), slot);
        Value::Blob(slot)
    }

    /// Attach a fully built sub-database, addressable as one value of this
    /// database. Nested databases are not content-addressed.
    pub fn w_nested(&mut self, sub: Database) -> Value {
        let slot = self.nested.len() as u32;
        self.nested.push(sub);
        Value::Db(slot)
    }

    pub(crate) fn intern_object(&mut self, fields: Vec<(u16, Value)>) -> Value {
        if let Some(&slot) = self.object_index.get(fields.as_slice()) {
            return Value::Object(slot);
        }
        let slot = self.objects.len() as u32;
        self.object_index.insert(fields.clone(), slot);
        self.objects.push(fields);
        Value::Object(slot)
    }

    pub(crate) fn intern_array(&mut self, items: Vec<Value>) -> Value {
        if let Some(&slot) = self.array_index.get(items.as_slice()) {
            return Value::Array(slot);
        }
        let slot = self.arrays.len() as u32;
        self.array_index.insert(items.clone(), slot);
        self.arrays.push(items);
        Value::Array(slot)
    }

    /// Read an integer value.
    pub fn r_int(&self, v: Value) -> Option<u32> {
        match v {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Read a blob value from the pool.
    pub fn r_blob(&self, v: Value) -> Option<&[u8]> {
        match v {
            Value::Blob(slot) => self.blobs.get(slot as usize).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Read a blob value as UTF-8 text.
    pub fn r_text(&self, v: Value) -> Option<&str> {
        self.r_blob(v).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Dereference a nested sub-database.
    pub fn nested(&self, v: Value) -> Option<&Database> {
        match v {
            Value::Db(slot) => self.nested.get(slot as usize),
            _ => None,
        }
    }

    /// Read a committed object. A nested-database value dereferences to
    /// the sub-database's root object.
    pub fn obj(&self, schema: &'static ObjectSchema, v: Value) -> Option<Obj<'_>> {
        match v {
            Value::Object(slot) => {
                let fields = self.objects.get(slot as usize)?;
                Some(Obj {
                    db: self,
                    schema,
                    fields,
                })
            }
            Value::Db(_) => {
                let sub = self.nested(v)?;
                sub.obj(schema, sub.root())
            }
            _ => None,
        }
    }

    /// Read a committed array.
    pub fn arr(&self, schema: &'static ArraySchema, v: Value) -> Option<Arr<'_>> {
        match v {
            Value::Array(slot) => {
                let items = self.arrays.get(slot as usize)?;
                Some(Arr {
                    db: self,
                    schema,
                    items,
                })
            }
            _ => None,
        }
    }
}

/// Read-only view of a committed object.
#[derive(Clone, Copy)]
pub struct Obj<'a> {
    pub db: &'a Database,
    pub schema: &'static ObjectSchema,
    fields: &'a [(u16, Value)],
}

impl<'a> Obj<'a> {
    /// The stored value of a field, `Null` when elided.
    pub fn val(&self, index: u16) -> Value {
        self.fields
            .iter()
            .find(|(i, _)| *i == index)
            .map(|&(_, v)| v)
            .unwrap_or(Value::Null)
    }

    /// Integer field with the schema default applied to elided fields.
    pub fn int(&self, index: u16) -> u32 {
        match self.val(index) {
            Value::Int(n) => n,
            Value::Null => self.schema.default_int(index).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn blob(&self, index: u16) -> Option<&'a [u8]> {
        self.db.r_blob(self.val(index))
    }

    pub fn text(&self, index: u16) -> Option<&'a str> {
        self.db.r_text(self.val(index))
    }

    /// Dereference an object-valued field using its field schema.
    pub fn obj(&self, index: u16) -> Option<Obj<'a>> {
        let field = self.schema.field(index)?;
        let schema = field.schema.object_schema()?;
        self.db.obj(schema, self.val(index))
    }

    /// Dereference an array-valued field using its field schema.
    pub fn arr(&self, index: u16) -> Option<Arr<'a>> {
        let field = self.schema.field(index)?;
        match field.schema {
            SchemaRef::Array(s) => self.db.arr(s, self.val(index)),
            _ => None,
        }
    }

    /// Order two objects by one field, dereferencing each side in its own
    /// database.
    pub fn cmp_field(&self, other: &Obj<'_>, index: u16) -> Ordering {
        match self.schema.field(index) {
            Some(field) => field.schema.compare_values(
                self.db,
                self.val(index),
                other.db,
                other.val(index),
            ),
            None => Ordering::Equal,
        }
    }

    /// Iterate the stored `(field index, value)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (u16, Value)> + 'a {
        self.fields.iter().copied()
    }
}

/// Read-only view of a committed array.
#[derive(Clone, Copy)]
pub struct Arr<'a> {
    pub db: &'a Database,
    pub schema: &'static ArraySchema,
    items: &'a [Value],
}

impl<'a> Arr<'a> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Value {
        self.items.get(i).copied().unwrap_or(Value::Null)
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + 'a {
        self.items.iter().copied()
    }

    /// Dereference one element as an object using the element schema.
    pub fn obj_at(&self, i: usize) -> Option<Obj<'a>> {
        let schema = self.schema.element.object_schema()?;
        self.db.obj(schema, self.get(i))
    }

    /// Iterate the elements as objects, skipping undecodable entries.
    pub fn objs(&self) -> impl Iterator<Item = Obj<'a>> + 'a {
        let this = *self;
        (0..self.len()).filter_map(move |i| this.obj_at(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_dedup() {
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        let a = db.w_blob(b"hello");
        let b = db.w_blob(b"world");
        let c = db.w_blob(b"hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(db.blob_count(), 2);
    }

    #[test]
    fn test_blob_pool_size_equals_distinct_inputs() {
        let inputs: &[&[u8]] = &[b"a", b"b", b"a", b"c", b"b", b"a"];
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        for b in inputs {
            db.w_blob(b);
        }
        assert_eq!(db.blob_count(), 3);
    }

    #[test]
    fn test_int_pool_interning() {
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        assert_eq!(db.w_int(42), Value::Int(42));
        assert!(db.ints.is_empty());
        let wide = 0x1234_5678_u32.wrapping_mul(16);
        db.w_int(wide);
        db.w_int(wide);
        assert_eq!(db.ints.len(), 1);
    }

    #[test]
    fn test_r_blob_round_trip() {
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        let v = db.w_blob(b"contents");
        assert_eq!(db.r_blob(v), Some(&b"contents"[..]));
        assert_eq!(db.r_text(v), Some("contents"));
        assert_eq!(db.r_blob(Value::Null), None);
    }

    #[test]
    fn test_nested_database() {
        let mut sub = Database::new(SchemaId::from_tag(*b"pckg"));
        let blob = sub.w_blob(b"inner");
        sub.set_root(blob);

        let mut db = Database::new(SchemaId::from_tag(*b"idb\0"));
        let v = db.w_nested(sub);
        let inner = db.nested(v).unwrap();
        assert_eq!(inner.r_blob(inner.root()), Some(&b"inner"[..]));
    }
}
