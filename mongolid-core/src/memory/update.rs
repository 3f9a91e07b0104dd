//! Update operator application.

use bson::{Bson, Document};

use super::filter::bson_eq;
use crate::error::{OdmError, OdmResult};

/// Apply an update document in place.
pub(crate) fn apply(document: &mut Document, update: &Document) -> OdmResult<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(OdmError::storage(format!("update operator '{operator}' needs a document")));
        };
        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone()),
                "$unset" => unset_path(document, path),
                "$pull" => pull_path(document, path, value)?,
                "$inc" => increment_path(document, path, value)?,
                other => return Err(OdmError::storage(format!("unsupported update operator '{other}'"))),
            }
        }
    }
    Ok(())
}

/// Seed an upserted document from the equality conditions of a filter.
pub(crate) fn seed_from_filter(filter: &Document) -> Document {
    let mut seeded = Document::new();
    for (path, condition) in filter {
        if path.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut seeded, path, value.clone());
                }
            }
            value => set_path(&mut seeded, path, value.clone()),
        }
    }
    seeded
}

/// Whether a document holds update operators rather than replacement fields.
pub(crate) fn is_operator_document(update: &Document) -> bool {
    update.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn slot<'a>(document: &'a mut Document, path: &str, create: bool) -> Option<(&'a mut Bson, String)> {
    let (parent, last) = path.rsplit_once('.')?;

    let mut segments = parent.split('.');
    let first = segments.next()?;
    if create && !document.contains_key(first) {
        document.insert(first, Document::new());
    }
    let mut current = document.get_mut(first)?;
    for segment in segments {
        current = child(current, segment, create)?;
    }
    Some((current, last.to_string()))
}

fn child<'a>(value: &'a mut Bson, segment: &str, create: bool) -> Option<&'a mut Bson> {
    match value {
        Bson::Document(doc) => {
            if create && !doc.contains_key(segment) {
                doc.insert(segment, Document::new());
            }
            doc.get_mut(segment)
        }
        Bson::Array(items) => {
            let index = segment.parse::<usize>().ok()?;
            items.get_mut(index)
        }
        _ => None,
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    if !path.contains('.') {
        document.insert(path, value);
        return;
    }
    let Some((parent, last)) = slot(document, path, true) else {
        return;
    };
    match parent {
        Bson::Document(doc) => {
            doc.insert(last, value);
        }
        Bson::Array(items) => {
            if let Ok(index) = last.parse::<usize>() {
                while items.len() <= index {
                    items.push(Bson::Null);
                }
                items[index] = value;
            }
        }
        _ => {}
    }
}

/// Unsetting an array element leaves `null` in its place, the way storage
/// keeps array positions stable.
fn unset_path(document: &mut Document, path: &str) {
    if !path.contains('.') {
        document.remove(path);
        return;
    }
    let Some((parent, last)) = slot(document, path, false) else {
        return;
    };
    match parent {
        Bson::Document(doc) => {
            doc.remove(&last);
        }
        Bson::Array(items) => {
            if let Some(item) = last.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                *item = Bson::Null;
            }
        }
        _ => {}
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    if !path.contains('.') {
        return document.get_mut(path);
    }
    let (parent, last) = slot(document, path, false)?;
    child(parent, &last, false)
}

fn pull_path(document: &mut Document, path: &str, value: &Bson) -> OdmResult<()> {
    match get_path_mut(document, path) {
        Some(Bson::Array(items)) => items.retain(|item| !bson_eq(item, value)),
        Some(_) => return Err(OdmError::storage(format!("cannot $pull from non-array field '{path}'"))),
        None => {}
    }
    Ok(())
}

fn increment_path(document: &mut Document, path: &str, by: &Bson) -> OdmResult<()> {
    let current = get_path_mut(document, path).cloned();
    let next = match (current.unwrap_or(Bson::Int32(0)), by) {
        (Bson::Null, by) => by.clone(),
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or(Bson::Int64(i64::from(a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(a as f64 + b),
        (other, _) => {
            return Err(OdmError::storage(format!(
                "cannot $inc non-numeric field '{path}' holding {:?}",
                other.element_type()
            )));
        }
    };
    set_path(document, path, next);
    Ok(())
}
