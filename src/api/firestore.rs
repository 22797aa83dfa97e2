//! Firestore REST value encoding for note documents.
//!
//! Documents look like:
//! `{"name": ".../documents/notes/<id>", "fields": {"body": {"stringValue": "..."},
//! "createdAt": {"integerValue": "1700000000000"}, ...}}`

use crate::models::{NoteData, NotePatch};
use crate::store::{DocumentSnapshot, StoreError, StoreResult};
use serde::Serialize;
use serde_json::{json, Map, Value};

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

// 64-bit integers travel as decimal strings.
fn integer_value(n: i64) -> Value {
    json!({ "integerValue": n.to_string() })
}

fn typed_value(v: &Value) -> Value {
    match v {
        Value::String(s) => string_value(s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => integer_value(i),
            None => json!({ "doubleValue": n }),
        },
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Null => json!({ "nullValue": null }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(typed_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": typed_fields(map) } }),
    }
}

fn typed_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), typed_value(v))).collect()
}

/// Wrap a record's serde fields as a Firestore `fields` object.
/// Fields the record skips while serializing are left out.
pub(crate) fn encode_fields<T: Serialize>(record: &T) -> StoreResult<Value> {
    match serde_json::to_value(record).map_err(StoreError::parse)? {
        Value::Object(map) => Ok(json!({ "fields": typed_fields(&map) })),
        other => Err(StoreError::Parse(format!(
            "expected a record, got {other}"
        ))),
    }
}

pub(crate) fn encode_data(data: &NoteData) -> StoreResult<Value> {
    encode_fields(data)
}

pub(crate) fn encode_patch(patch: &NotePatch) -> StoreResult<Value> {
    encode_fields(patch)
}

/// Last path segment of a document resource name.
pub(crate) fn document_id(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|s| !s.trim().is_empty())
}

fn read_string(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(|s| s.to_string())
}

fn read_integer(fields: &Value, key: &str) -> Option<i64> {
    let v = fields.get(key)?;
    if let Some(s) = v.get("integerValue") {
        // Usually a string, but accept a bare number as well.
        return s
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| s.as_i64());
    }
    v.get("doubleValue")
        .and_then(|d| d.as_f64())
        .map(|d| d.round() as i64)
}

/// Decode one document. Missing fields fall back to empty values.
pub(crate) fn decode_document(doc: &Value) -> Option<DocumentSnapshot> {
    let name = doc.get("name")?.as_str()?;
    let id = document_id(name)?.to_string();

    let empty = Value::Null;
    let fields = doc.get("fields").unwrap_or(&empty);

    Some(DocumentSnapshot {
        id,
        data: NoteData {
            body: read_string(fields, "body").unwrap_or_default(),
            created_at: read_integer(fields, "createdAt").unwrap_or_default(),
            updated_at: read_integer(fields, "updatedAt").unwrap_or_default(),
        },
    })
}

/// One page of a list response plus the token for the next page, if any.
pub(crate) fn parse_list_response(data: &Value) -> (Vec<DocumentSnapshot>, Option<String>) {
    let docs = data
        .get("documents")
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(decode_document).collect())
        .unwrap_or_default();

    let next = data
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    (docs, next)
}
