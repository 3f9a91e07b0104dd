//! Value helpers shared by coercion, diffing and query resolution.

use bson::{Bson, Document, oid::ObjectId};

/// Check whether a string looks like a hex-encoded ObjectId.
#[inline]
pub fn is_object_id_str(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Convert a 24-char hex string to a native ObjectId, passing anything else through.
pub fn to_object_id(value: Bson) -> Bson {
    if let Bson::String(s) = &value {
        if is_object_id_str(s) {
            if let Ok(oid) = ObjectId::parse_str(s) {
                return Bson::ObjectId(oid);
            }
        }
    }
    value
}

/// Render an id value as the string used in cache keys and dedup sets.
pub fn id_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::DateTime(dt) => dt.timestamp_millis().to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Null, empty array or empty document.
#[inline]
pub fn is_blank(value: &Bson) -> bool {
    match value {
        Bson::Null => true,
        Bson::Array(items) => items.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        _ => false,
    }
}

/// A document or array holding at least one entry.
#[inline]
pub fn is_filled_composite(value: &Bson) -> bool {
    match value {
        Bson::Array(items) => !items.is_empty(),
        Bson::Document(doc) => !doc.is_empty(),
        _ => false,
    }
}

/// Loose truthiness: `null`, `false`, `0`, `0.0`, `""`, `"0"` and empty
/// composites are falsy.
pub fn is_falsy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::Boolean(b) => !b,
        Bson::Int32(i) => *i == 0,
        Bson::Int64(i) => *i == 0,
        Bson::Double(f) => *f == 0.0,
        Bson::String(s) => s.is_empty() || s == "0",
        Bson::Array(items) => items.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        _ => false,
    }
}

/// Remove `null` entries from arrays and documents, recursively.
///
/// Arrays are re-indexed after filtering.
pub fn strip_nulls(value: Bson) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(
            items
                .into_iter()
                .filter(|item| !matches!(item, Bson::Null))
                .map(strip_nulls)
                .collect(),
        ),
        Bson::Document(doc) => Bson::Document(strip_document_nulls(doc)),
        other => other,
    }
}

/// Remove `null` fields from a document, recursively.
pub fn strip_document_nulls(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(_, v)| !matches!(v, Bson::Null))
        .map(|(k, v)| (k, strip_nulls(v)))
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(i) => Some(Self::Int(i64::from(*i))),
            Bson::Int64(i) => Some(Self::Int(*i)),
            Bson::Double(f) => Some(Self::Float(*f)),
            Bson::String(s) => Self::parse(s),
            _ => None,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Self::Int(i));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Self::Float)
    }

    fn equals(self, other: Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => a as f64 == b,
            (Self::Float(a), Self::Float(b)) => a == b,
        }
    }
}

/// Loose equality used by change tracking.
///
/// Mirrors the type juggling the storage layer applies at write time:
///
/// - numbers compare by value across `Int32`, `Int64` and `Double`
/// - numeric strings compare equal to the number they spell (`"10" == 10`),
///   and two numeric strings compare numerically (`"1" == "01"`)
/// - a boolean equals a scalar with the same truthiness (`true == 1`,
///   `false == ""`)
/// - an ObjectId equals its hex string
/// - documents compare key by key regardless of order, arrays element-wise
///
/// Everything else falls back to strict equality.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Null, Bson::Null) => true,
        (Bson::Null, _) | (_, Bson::Null) => false,
        (Bson::Boolean(x), Bson::Boolean(y)) => x == y,
        (Bson::Boolean(x), other) | (other, Bson::Boolean(x)) if is_scalar(other) => {
            *x != is_falsy(other)
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x == y,
        (Bson::ObjectId(oid), Bson::String(s)) | (Bson::String(s), Bson::ObjectId(oid)) => {
            oid.to_hex().eq_ignore_ascii_case(s)
        }
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis() == y.timestamp_millis(),
        (Bson::String(x), Bson::String(y)) => match (Number::parse(x), Number::parse(y)) {
            (Some(nx), Some(ny)) => nx.equals(ny),
            _ => x == y,
        },
        (Bson::Document(x), Bson::Document(y)) => documents_equal(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        _ => match (Number::of(a), Number::of(b)) {
            (Some(x), Some(y)) => x.equals(y),
            _ => a == b,
        },
    }
}

/// Loose equality over whole documents, ignoring key order.
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
}

fn is_scalar(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::String(_)
    )
}
