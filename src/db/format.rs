// src/db/format.rs

//! Binary serialization
//!
//! The on-disk form is the magic prefix, the schema id, then a sequence of
//! length-prefixed blocks in fixed order: int pool, blob pool, object
//! pool, array pool, nested-database pool, root value. Pool order is
//! commit order, so equal logical inputs serialize byte-identically.
//! Nested databases are embedded as complete files with their own magic.

use std::io::{Read, Write};

use crate::error::{Error, Result};

use super::Database;
use super::schema::SchemaId;
use super::value::{
    ErrorCode, KIND_ARRAY, KIND_BLOB, KIND_DB, KIND_ERROR, KIND_INT, KIND_INT32, KIND_NULL,
    KIND_OBJECT, VALUE_MASK, Value,
};

/// File magic for a serialized database.
pub const MAGIC: [u8; 4] = *b"LDR.";

const BLOCK_INT: u8 = 1;
const BLOCK_BLOB: u8 = 2;
const BLOCK_OBJECT: u8 = 3;
const BLOCK_ARRAY: u8 = 4;
const BLOCK_NESTED: u8 = 5;
const BLOCK_ROOT: u8 = 6;

/// Nested databases inside nested databases bottom out here.
const MAX_DEPTH: u32 = 8;

fn encode_value(db: &Database, v: Value) -> Result<u32> {
    let raw = match v {
        Value::Null => 0,
        Value::Error(e) => (KIND_ERROR << 28) | e as u32,
        Value::Int(n) if n <= VALUE_MASK => (KIND_INT << 28) | n,
        Value::Int(n) => match db.int_index.get(&n) {
            Some(&slot) => (KIND_INT32 << 28) | slot,
            None => {
                return Err(Error::BadFormat(format!(
                    "integer {n} missing from the int pool"
                )));
            }
        },
        Value::Blob(i) => (KIND_BLOB << 28) | i,
        Value::Object(i) => (KIND_OBJECT << 28) | i,
        Value::Array(i) => (KIND_ARRAY << 28) | i,
        Value::Db(i) => (KIND_DB << 28) | i,
    };
    Ok(raw)
}

fn push_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_le_bytes());
}

/// Serialize `db` into `out`.
pub fn write(db: &Database, out: &mut impl Write) -> Result<()> {
    out.write_all(&to_vec(db)?)?;
    Ok(())
}

/// Serialize `db` into a byte vector.
pub fn to_vec(db: &Database) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&db.schema_id.tag());

    if !db.ints.is_empty() {
        let mut payload = Vec::new();
        push_u32(&mut payload, db.ints.len() as u32);
        for &n in &db.ints {
            push_u32(&mut payload, n);
        }
        write_block(&mut out, BLOCK_INT, &payload);
    }

    if !db.blobs.is_empty() {
        let mut payload = Vec::new();
        push_u32(&mut payload, db.blobs.len() as u32);
        for b in &db.blobs {
            push_u32(&mut payload, b.len() as u32);
            payload.extend_from_slice(b);
        }
        write_block(&mut out, BLOCK_BLOB, &payload);
    }

    if !db.objects.is_empty() {
        let mut payload = Vec::new();
        push_u32(&mut payload, db.objects.len() as u32);
        for fields in &db.objects {
            push_u32(&mut payload, fields.len() as u32);
            for &(index, v) in fields {
                push_u32(&mut payload, index as u32);
                push_u32(&mut payload, encode_value(db, v)?);
            }
        }
        write_block(&mut out, BLOCK_OBJECT, &payload);
    }

    if !db.arrays.is_empty() {
        let mut payload = Vec::new();
        push_u32(&mut payload, db.arrays.len() as u32);
        for items in &db.arrays {
            push_u32(&mut payload, items.len() as u32);
            for &v in items {
                push_u32(&mut payload, encode_value(db, v)?);
            }
        }
        write_block(&mut out, BLOCK_ARRAY, &payload);
    }

    if !db.nested.is_empty() {
        let mut payload = Vec::new();
        push_u32(&mut payload, db.nested.len() as u32);
        for sub in &db.nested {
            let bytes = to_vec(sub)?;
            push_u32(&mut payload, bytes.len() as u32);
            payload.extend_from_slice(&bytes);
        }
        write_block(&mut out, BLOCK_NESTED, &payload);
    }

    let mut payload = Vec::new();
    push_u32(&mut payload, encode_value(db, db.root)?);
    write_block(&mut out, BLOCK_ROOT, &payload);

    Ok(out)
}

fn write_block(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    push_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

/// Deserialize a database, reading the stream to its end.
pub fn read(input: &mut impl Read) -> Result<Database> {
    let mut buf = Vec::new();
    input.read_to_end(&mut buf)?;
    from_bytes(&buf)
}

/// Deserialize a database from a byte slice.
pub fn from_bytes(buf: &[u8]) -> Result<Database> {
    parse(buf, 0)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::BadFormat("truncated block".into()))?;
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let s = self.take(4)?;
        Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn done(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn parse(buf: &[u8], depth: u32) -> Result<Database> {
    if depth > MAX_DEPTH {
        return Err(Error::BadFormat("nesting too deep".into()));
    }
    let mut cur = Cursor { buf, pos: 0 };
    if cur.take(4)? != MAGIC {
        return Err(Error::BadFormat("bad magic".into()));
    }
    let schema_id = SchemaId(cur.u32()?);

    let mut ints: Vec<u32> = Vec::new();
    let mut blobs: Vec<Vec<u8>> = Vec::new();
    let mut raw_objects: Vec<Vec<(u16, u32)>> = Vec::new();
    let mut raw_arrays: Vec<Vec<u32>> = Vec::new();
    let mut nested: Vec<Database> = Vec::new();
    let mut root_raw: u32 = 0;
    let mut saw_root = false;
    let mut last_tag = 0u8;

    while !cur.done() {
        let tag = cur.u8()?;
        if tag <= last_tag || tag > BLOCK_ROOT {
            return Err(Error::BadFormat(format!("unexpected block tag {tag}")));
        }
        last_tag = tag;
        let len = cur.u32()? as usize;
        let payload = cur.take(len)?;
        let mut block = Cursor {
            buf: payload,
            pos: 0,
        };
        match tag {
            BLOCK_INT => {
                let count = block.u32()?;
                for _ in 0..count {
                    ints.push(block.u32()?);
                }
            }
            BLOCK_BLOB => {
                let count = block.u32()?;
                for _ in 0..count {
                    let n = block.u32()? as usize;
                    blobs.push(block.take(n)?.to_vec());
                }
            }
            BLOCK_OBJECT => {
                let count = block.u32()?;
                for _ in 0..count {
                    let nfields = block.u32()?;
                    let mut fields = Vec::with_capacity(nfields as usize);
                    for _ in 0..nfields {
                        let index = block.u32()?;
                        let raw = block.u32()?;
                        let index = u16::try_from(index).map_err(|_| {
                            Error::BadFormat("field index out of range".into())
                        })?;
                        fields.push((index, raw));
                    }
                    raw_objects.push(fields);
                }
            }
            BLOCK_ARRAY => {
                let count = block.u32()?;
                for _ in 0..count {
                    let nitems = block.u32()?;
                    let mut items = Vec::with_capacity(nitems as usize);
                    for _ in 0..nitems {
                        items.push(block.u32()?);
                    }
                    raw_arrays.push(items);
                }
            }
            BLOCK_NESTED => {
                let count = block.u32()?;
                for _ in 0..count {
                    let n = block.u32()? as usize;
                    nested.push(parse(block.take(n)?, depth + 1)?);
                }
            }
            BLOCK_ROOT => {
                root_raw = block.u32()?;
                saw_root = true;
            }
            _ => unreachable!(),
        }
        if !block.done() {
            return Err(Error::BadFormat(format!("trailing bytes in block {tag}")));
        }
    }
    if !saw_root {
        return Err(Error::BadFormat("missing root block".into()));
    }

    let counts = PoolCounts {
        ints: ints.len() as u32,
        blobs: blobs.len() as u32,
        objects: raw_objects.len() as u32,
        arrays: raw_arrays.len() as u32,
        nested: nested.len() as u32,
    };

    let mut db = Database::new(schema_id);
    db.ints = ints;
    db.blobs = blobs;
    db.nested = nested;
    db.objects = raw_objects
        .into_iter()
        .map(|fields| {
            fields
                .into_iter()
                .map(|(i, raw)| (i, decode_value(raw, &counts, &db.ints)))
                .collect()
        })
        .collect();
    db.arrays = raw_arrays
        .into_iter()
        .map(|items| {
            items
                .into_iter()
                .map(|raw| decode_value(raw, &counts, &db.ints))
                .collect()
        })
        .collect();
    db.root = decode_value(root_raw, &counts, &db.ints);

    // Rebuild the content-address indices so the database stays
    // deduplicating if building continues after a load.
    for (slot, n) in db.ints.iter().enumerate() {
        db.int_index.insert(*n, slot as u32);
    }
    for (slot, b) in db.blobs.iter().enumerate() {
        db.blob_index.insert(b.clone(), slot as u32);
    }
    for (slot, fields) in db.objects.iter().enumerate() {
        db.object_index.insert(fields.clone(), slot as u32);
    }
    for (slot, items) in db.arrays.iter().enumerate() {
        db.array_index.insert(items.clone(), slot as u32);
    }

    Ok(db)
}

struct PoolCounts {
    ints: u32,
    blobs: u32,
    objects: u32,
    arrays: u32,
    nested: u32,
}

/// Decode one on-disk value. A reference to a missing pool slot decodes to
/// a sticky error value rather than failing the whole load.
fn decode_value(raw: u32, counts: &PoolCounts, ints: &[u32]) -> Value {
    let kind = raw >> 28;
    let payload = raw & VALUE_MASK;
    match kind {
        KIND_NULL => Value::Null,
        KIND_ERROR => match ErrorCode::from_code(payload) {
            Some(e) => Value::Error(e),
            None => Value::Error(ErrorCode::Format),
        },
        KIND_INT => Value::Int(payload),
        KIND_INT32 => match ints.get(payload as usize) {
            Some(&n) => Value::Int(n),
            None => Value::Error(ErrorCode::Format),
        },
        KIND_BLOB if payload < counts.blobs => Value::Blob(payload),
        KIND_OBJECT if payload < counts.objects => Value::Object(payload),
        KIND_ARRAY if payload < counts.arrays => Value::Array(payload),
        KIND_DB if payload < counts.nested => Value::Db(payload),
        _ => Value::Error(ErrorCode::Format),
    }
}
