//! Filter evaluation.

use std::cmp::Ordering;

use bson::{Bson, Document};

/// Values found at a dotted path. Arrays met along the way are traversed,
/// so `skus.shop_id` yields the `shop_id` of every embedded sku.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Bson> = document.get(first).into_iter().collect();

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Bson::Document(doc) => next.extend(doc.get(segment)),
                Bson::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => next.extend(items.get(index)),
                    Err(_) => next.extend(items.iter().filter_map(|item| match item {
                        Bson::Document(doc) => doc.get(segment),
                        _ => None,
                    })),
                },
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Whether a document matches a filter.
pub(crate) fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => each_filter(condition).all(|f| matches(document, f)),
        "$or" => each_filter(condition).any(|f| matches(document, f)),
        "$nor" => !each_filter(condition).any(|f| matches(document, f)),
        path => matches_path(&lookup(document, path), condition),
    })
}

fn each_filter(condition: &Bson) -> impl Iterator<Item = &Document> {
    let items: &[Bson] = match condition {
        Bson::Array(items) => items,
        _ => &[],
    };
    items.iter().filter_map(Bson::as_document)
}

fn matches_path(values: &[&Bson], condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, operand)| apply_operator(values, op, operand))
        }
        expected => equals_any(values, expected),
    }
}

fn apply_operator(values: &[&Bson], op: &str, operand: &Bson) -> bool {
    match op {
        "$eq" => equals_any(values, operand),
        "$ne" => !equals_any(values, operand),
        "$in" => in_list(values, operand),
        "$nin" => !in_list(values, operand),
        "$exists" => {
            let wanted = !matches!(operand, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0));
            values.is_empty() != wanted
        }
        "$gt" => compares(values, operand, |o| o == Ordering::Greater),
        "$gte" => compares(values, operand, |o| o != Ordering::Less),
        "$lt" => compares(values, operand, |o| o == Ordering::Less),
        "$lte" => compares(values, operand, |o| o != Ordering::Greater),
        _ => false,
    }
}

fn in_list(values: &[&Bson], operand: &Bson) -> bool {
    match operand {
        Bson::Array(candidates) => candidates.iter().any(|candidate| equals_any(values, candidate)),
        _ => false,
    }
}

/// Equality as storage applies it: a missing field equals `null`, and an
/// array field matches when it equals the value or contains it.
fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    if values.is_empty() {
        return matches!(expected, Bson::Null);
    }
    values.iter().any(|value| {
        bson_eq(value, expected)
            || matches!(value, Bson::Array(items) if items.iter().any(|item| bson_eq(item, expected)))
    })
}

fn compares(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|value| compare(value, operand).is_some_and(&accept))
}

/// Equality with numbers compared by value across types.
pub(crate) fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering between comparable values of the same kind.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}
