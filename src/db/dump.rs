// src/db/dump.rs

//! Schema-driven text rendering
//!
//! Walks a schema tree together with a value and renders the object graph
//! as indented text: `name: value` lines for scalar fields, `- ` items for
//! arrays, indented blocks for nested objects and multiline scalars.

use super::schema::{ObjectSchema, SchemaRef};
use super::value::Value;
use super::{Database, Obj};

/// Render a value bound to a top-level object schema.
pub fn render(db: &Database, schema: &'static ObjectSchema, v: Value) -> String {
    let mut out = String::new();
    match db.obj(schema, v) {
        Some(obj) => render_object(&mut out, "", obj),
        None => render_leaf(&mut out, db, v),
    }
    out
}

fn render_leaf(out: &mut String, _db: &Database, v: Value) {
    match v {
        Value::Null => {}
        Value::Error(e) => {
            out.push_str(&format!("(error: {e})\n"));
        }
        other => {
            out.push_str(&format!("{other:?}\n"));
        }
    }
}

fn render_object(out: &mut String, indent: &str, obj: Obj<'_>) {
    for field in obj.schema.fields {
        let v = obj.val(field.index);
        if v.is_null() {
            continue;
        }
        render_field(out, indent, obj, field.index, field.name, field.schema, v);
    }
}

fn render_field(
    out: &mut String,
    indent: &str,
    obj: Obj<'_>,
    index: u16,
    name: &str,
    schema: SchemaRef,
    v: Value,
) {
    match schema {
        SchemaRef::Scalar(s) => {
            let Some(text) = s.tostring.and_then(|f| f(obj.db, v, usize::MAX)) else {
                return;
            };
            if s.multiline && text.contains('\n') {
                out.push_str(&format!("{indent}{name}: |\n"));
                for line in text.lines() {
                    out.push_str(&format!("{indent}  {line}\n"));
                }
            } else {
                out.push_str(&format!("{indent}{name}: {text}\n"));
            }
        }
        SchemaRef::Object(_) | SchemaRef::Nested(_) => {
            let Some(sub) = obj.obj(index) else {
                render_error(out, indent, name, v);
                return;
            };
            if let Some(text) = sub.schema.tostring.and_then(|f| f(sub)) {
                out.push_str(&format!("{indent}{name}: {text}\n"));
            } else {
                out.push_str(&format!("{indent}{name}:\n"));
                let deeper = format!("{indent}  ");
                render_object(out, &deeper, sub);
            }
        }
        SchemaRef::Array(s) => {
            let Some(arr) = obj.arr(index) else {
                render_error(out, indent, name, v);
                return;
            };
            if arr.is_empty() {
                return;
            }
            out.push_str(&format!("{indent}{name}:\n"));
            for i in 0..arr.len() {
                render_item(out, indent, arr.db, s.element, arr.get(i));
            }
        }
    }
}

fn render_item(out: &mut String, indent: &str, db: &Database, element: SchemaRef, v: Value) {
    match element {
        SchemaRef::Scalar(s) => {
            if let Some(text) = s.tostring.and_then(|f| f(db, v, usize::MAX)) {
                out.push_str(&format!("{indent}- {text}\n"));
            }
        }
        SchemaRef::Object(_) | SchemaRef::Nested(_) => {
            let Some(schema) = element.object_schema() else {
                return;
            };
            let Some(sub) = db.obj(schema, v) else {
                out.push_str(&format!("{indent}- (error)\n"));
                return;
            };
            if let Some(text) = schema.tostring.and_then(|f| f(sub)) {
                out.push_str(&format!("{indent}- {text}\n"));
                return;
            }
            let mut body = String::new();
            let deeper = format!("{indent}  ");
            render_object(&mut body, &deeper, sub);
            // Hoist the first line onto the "- " marker.
            let mut first = true;
            for line in body.lines() {
                if first {
                    out.push_str(&format!("{indent}- {}\n", line.trim_start()));
                    first = false;
                } else {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        SchemaRef::Array(_) => {
            // Arrays of arrays do not occur in any schema here.
        }
    }
}

fn render_error(out: &mut String, indent: &str, name: &str, v: Value) {
    if let Some(e) = v.error() {
        out.push_str(&format!("{indent}{name}: (error: {e})\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::ObjectBuilder;
    use super::super::schema::{
        ArraySchema, Field, ScalarKind, ScalarSchema, SchemaId, SchemaRef,
    };
    use super::*;

    fn text_tostring(db: &Database, v: Value, _limit: usize) -> Option<String> {
        db.r_text(v).map(str::to_string)
    }

    fn text_fromstring(db: &mut Database, text: &[u8]) -> Value {
        db.w_blob(text)
    }

    static SCALAR_TEXT: ScalarSchema = ScalarSchema {
        kind: ScalarKind::Blob,
        multiline: false,
        tostring: Some(text_tostring),
        fromstring: Some(text_fromstring),
        compare: None,
    };

    static NOTE_ARRAY: ArraySchema = ArraySchema {
        element: SchemaRef::Scalar(&SCALAR_TEXT),
        max_items: 16,
        pre_commit: None,
        fromstring: None,
    };

    static SAMPLE: ObjectSchema = ObjectSchema {
        num_fields: 3,
        fields: &[
            Field {
                index: 1,
                name: "name",
                schema: SchemaRef::Scalar(&SCALAR_TEXT),
            },
            Field {
                index: 2,
                name: "notes",
                schema: SchemaRef::Array(&NOTE_ARRAY),
            },
        ],
        compare: None,
        tostring: None,
        fromstring: None,
        default_int: None,
    };

    #[test]
    fn test_render_scalars_and_arrays() {
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        let a = db.w_blob(b"first");
        let b = db.w_blob(b"second");
        let arr = db.intern_array(vec![a, b]);
        let mut ob = ObjectBuilder::new(&SAMPLE);
        ob.set_blob(&mut db, 1, b"sample");
        ob.set(2, arr);
        let v = ob.commit(&mut db);

        let text = render(&db, &SAMPLE, v);
        assert_eq!(text, "name: sample\nnotes:\n- first\n- second\n");
    }

    #[test]
    fn test_render_skips_absent_fields() {
        let mut db = Database::new(SchemaId::from_tag(*b"test"));
        let mut ob = ObjectBuilder::new(&SAMPLE);
        ob.set_blob(&mut db, 1, b"only");
        let v = ob.commit(&mut db);
        assert_eq!(render(&db, &SAMPLE, v), "name: only\n");
    }
}
