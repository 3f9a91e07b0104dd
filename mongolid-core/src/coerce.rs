//! Per-field value coercion.
//!
//! These are the synchronous coercions. Sequences and nested schemas need
//! storage and registry access and are driven by the
//! [`mapper`](crate::mapper).

use bson::{Bson, oid::ObjectId};

use crate::error::{OdmError, OdmResult};
use crate::schema::Primitive;
use crate::value::{is_falsy, to_object_id};

/// Coerce a value with a primitive cast.
///
/// `null` and empty arrays pass through unchanged. Any other composite is
/// rejected, since it has no meaningful scalar form.
pub fn primitive(field: &str, value: Bson, primitive: Primitive) -> OdmResult<Bson> {
    match &value {
        Bson::Null => return Ok(value),
        Bson::Array(items) if items.is_empty() => return Ok(value),
        Bson::Array(_) | Bson::Document(_) => {
            return Err(OdmError::invalid_type(
                field,
                format!("cannot cast a {:?} to {primitive:?}", value.element_type()),
            ));
        }
        _ => {}
    }

    match primitive {
        Primitive::Int => to_int(field, value),
        Primitive::Float => to_float(field, value),
        Primitive::Bool => Ok(Bson::Boolean(!is_falsy(&value))),
        Primitive::String => to_string(field, value),
    }
}

/// Generate an id for `null`, convert hex strings, pass anything else through.
pub fn object_id(value: Bson) -> Bson {
    match value {
        Bson::Null => Bson::ObjectId(ObjectId::new()),
        other => to_object_id(other),
    }
}

/// Keep an existing native timestamp, otherwise stamp now.
pub fn created_at(value: Bson) -> Bson {
    match value {
        Bson::DateTime(_) => value,
        _ => Bson::DateTime(bson::DateTime::now()),
    }
}

/// Always stamp now.
pub fn updated_at(_value: Bson) -> Bson {
    Bson::DateTime(bson::DateTime::now())
}

fn int(value: i64) -> Bson {
    match i32::try_from(value) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(value),
    }
}

fn to_int(field: &str, value: Bson) -> OdmResult<Bson> {
    match value {
        Bson::Int32(_) | Bson::Int64(_) => Ok(value),
        Bson::Double(f) if f.is_finite() => Ok(int(f.trunc() as i64)),
        Bson::Double(_) => Ok(Bson::Int32(0)),
        Bson::Boolean(b) => Ok(Bson::Int32(i32::from(b))),
        Bson::String(s) => Ok(int(leading_number(&s).trunc() as i64)),
        Bson::DateTime(dt) => Ok(Bson::Int64(dt.timestamp_millis())),
        other => Err(unsupported(field, &other, Primitive::Int)),
    }
}

fn to_float(field: &str, value: Bson) -> OdmResult<Bson> {
    match value {
        Bson::Double(_) => Ok(value),
        Bson::Int32(i) => Ok(Bson::Double(f64::from(i))),
        Bson::Int64(i) => Ok(Bson::Double(i as f64)),
        Bson::Boolean(b) => Ok(Bson::Double(if b { 1.0 } else { 0.0 })),
        Bson::String(s) => Ok(Bson::Double(leading_number(&s))),
        other => Err(unsupported(field, &other, Primitive::Float)),
    }
}

fn to_string(field: &str, value: Bson) -> OdmResult<Bson> {
    let s = match value {
        Bson::String(_) => return Ok(value),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) => format_float(f),
        Bson::Boolean(true) => "1".to_string(),
        Bson::Boolean(false) => String::new(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map_err(|e| OdmError::invalid_type(field, e.to_string()))?,
        Bson::Symbol(s) => s,
        other => return Err(unsupported(field, &other, Primitive::String)),
    };
    Ok(Bson::String(s))
}

fn unsupported(field: &str, value: &Bson, primitive: Primitive) -> OdmError {
    OdmError::invalid_type(
        field,
        format!("cannot cast a {:?} to {primitive:?}", value.element_type()),
    )
}

/// Whole numbers print without a fractional part (`1.0` becomes `"1"`).
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Numeric value of the longest numeric prefix of a string, or zero.
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && matches!(bytes[end], b'+' | b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
        return 0.0;
    }

    // Optional exponent, only consumed when followed by digits.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(0.0)
}
