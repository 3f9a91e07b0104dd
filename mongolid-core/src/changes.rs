//! Change tracking.
//!
//! [`calculate_changes`] turns the difference between a freshly mapped
//! document and the model's snapshot into the minimal `$set` / `$unset`
//! update, recursing into embedded documents and arrays with dotted paths.
//!
//! Unsetting an array element leaves a `null` hole behind in storage, so
//! every unset of an array position also schedules a `$pull` of `null` on
//! the parent array. Numeric keys of embedded documents are plain fields. The pull must run as a second update, after the
//! primary one succeeded.
//!
//! ```rust
//! use bson::doc;
//! use mongolid_core::changes::calculate_changes;
//!
//! let old = doc! { "name": "John", "tags": ["a", "b"] };
//! let new = doc! { "name": "John", "tags": ["a"] };
//!
//! let changes = calculate_changes(&new, &old);
//! assert_eq!(changes.to_update_document(), doc! { "$set": { "tags": ["a"] } });
//! ```

use bson::{Bson, Document};

use crate::value::{strip_nulls, values_equal};

/// Update instructions moving a stored document from one state to another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    set: Document,
    unset: Document,
    pull: Vec<String>,
}

impl ChangeSet {
    /// Whether no write is needed.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Paths to set, with their values.
    pub fn set(&self) -> &Document {
        &self.set
    }

    /// Paths to unset.
    pub fn unset(&self) -> &Document {
        &self.unset
    }

    /// Array paths needing a `$pull` of `null` after the primary update.
    pub fn pull_paths(&self) -> &[String] {
        &self.pull
    }

    /// The primary update: `$set` and `$unset`, each omitted when empty.
    pub fn to_update_document(&self) -> Document {
        let mut update = Document::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            update.insert("$unset", self.unset.clone());
        }
        update
    }

    /// The follow-up update removing `null` holes, if any were scheduled.
    pub fn pull_document(&self) -> Option<Document> {
        if self.pull.is_empty() {
            return None;
        }
        let pulls: Document = self
            .pull
            .iter()
            .map(|path| (path.clone(), Bson::Null))
            .collect();
        let mut update = Document::new();
        update.insert("$pull", pulls);
        Some(update)
    }

    fn schedule_pull(&mut self, path: &str) {
        if !self.pull.iter().any(|p| p == path) {
            self.pull.push(path.to_string());
        }
    }
}

/// Compute the changes that turn `old` into `new`.
pub fn calculate_changes(new: &Document, old: &Document) -> ChangeSet {
    let mut changes = ChangeSet::default();
    diff(new, old, "", false, &mut changes);
    changes
}

/// `in_array` marks `new` and `old` as array views keyed by position.
fn diff(new: &Document, old: &Document, prefix: &str, in_array: bool, changes: &mut ChangeSet) {
    for (key, value) in new {
        if matches!(value, Bson::Null) {
            continue;
        }
        let path = format!("{prefix}{key}");

        match old.get(key) {
            None | Some(Bson::Null) => {
                changes.set.insert(path, strip_nulls(value.clone()));
            }
            Some(previous) if !values_equal(previous, value) => {
                match (as_entries(value), as_entries(previous)) {
                    (Some(new_entries), Some(old_entries)) if recursable(value, previous) => {
                        let indexed = matches!(value, Bson::Array(_));
                        diff(&new_entries, &old_entries, &format!("{path}."), indexed, changes);
                    }
                    _ => {
                        changes.set.insert(path, strip_nulls(value.clone()));
                    }
                }
            }
            Some(_) => {}
        }
    }

    for (key, previous) in old {
        if matches!(previous, Bson::Null) {
            continue;
        }
        if new.get(key).is_some_and(|value| !matches!(value, Bson::Null)) {
            continue;
        }

        changes.unset.insert(format!("{prefix}{key}"), "");
        if in_array {
            if let Some(parent) = prefix.strip_suffix('.') {
                changes.schedule_pull(parent);
            }
        }
    }
}

/// Both sides non-empty and of the same composite kind. A shrinking array is
/// overwritten whole, since its remaining elements shift position.
fn recursable(new: &Bson, old: &Bson) -> bool {
    match (new, old) {
        (Bson::Document(n), Bson::Document(o)) => !n.is_empty() && !o.is_empty(),
        (Bson::Array(n), Bson::Array(o)) => !n.is_empty() && !o.is_empty() && n.len() >= o.len(),
        _ => false,
    }
}

/// View a composite value as a document, arrays keyed by position.
fn as_entries(value: &Bson) -> Option<Document> {
    match value {
        Bson::Document(doc) => Some(doc.clone()),
        Bson::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item.clone()))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identical_documents_produce_no_changes() {
        let doc = doc! {
            "_id": ObjectId::new(),
            "name": "John",
            "address": { "city": "Curitiba", "geo": [1.5, 2.5] },
            "tags": ["a", "b"],
            "empty": [],
        };
        let changes = calculate_changes(&doc, &doc);
        assert!(changes.is_empty());
        assert_eq!(changes.to_update_document(), Document::new());
        assert!(changes.pull_document().is_none());
    }

    #[test]
    fn test_new_changed_and_removed_fields() {
        let old = doc! { "name": "John", "age": 30, "nick": "jj" };
        let new = doc! { "name": "John", "age": 31, "email": "j@x.com" };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.set(), &doc! { "age": 31, "email": "j@x.com" });
        assert_eq!(changes.unset(), &doc! { "nick": "" });
    }

    #[test]
    fn test_loose_equality_is_not_a_change() {
        let old = doc! { "age": "30", "score": 1.0, "active": 1 };
        let new = doc! { "age": 30, "score": 1, "active": true };
        assert!(calculate_changes(&new, &old).is_empty());
    }

    #[test]
    fn test_null_values_are_unsets_not_sets() {
        let old = doc! { "name": "John", "nick": "jj" };
        let new = doc! { "name": "John", "nick": null, "other": null };

        let changes = calculate_changes(&new, &old);
        assert!(changes.set().is_empty());
        assert_eq!(changes.unset(), &doc! { "nick": "" });
    }

    #[test]
    fn test_nested_documents_recurse_with_dotted_paths() {
        let old = doc! { "address": { "city": "Curitiba", "zip": "80000", "street": "A" } };
        let new = doc! { "address": { "city": "Londrina", "zip": "80000", "number": 10 } };

        let changes = calculate_changes(&new, &old);
        assert_eq!(
            changes.set(),
            &doc! { "address.city": "Londrina", "address.number": 10 }
        );
        assert_eq!(changes.unset(), &doc! { "address.street": "" });
        assert!(changes.pull_paths().is_empty());
    }

    #[test]
    fn test_array_shrink_is_a_full_set() {
        let old = doc! { "_id": "507f1f77bcf86cd799439011", "name": "John", "tags": ["a", "b"] };
        let new = doc! { "_id": "507f1f77bcf86cd799439011", "name": "John", "tags": ["a"] };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.to_update_document(), doc! { "$set": { "tags": ["a"] } });
    }

    #[test]
    fn test_array_growth_and_element_change_recurse() {
        let old = doc! { "tags": ["a", "b"] };
        let new = doc! { "tags": ["a", "c", "d"] };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.set(), &doc! { "tags.1": "c", "tags.2": "d" });
    }

    #[test]
    fn test_nulled_array_element_schedules_pull() {
        let old = doc! { "skus": [{ "sku": "1" }, { "sku": "2" }, { "sku": "3" }] };
        let new = doc! { "skus": [{ "sku": "1" }, null, { "sku": "3" }] };

        let changes = calculate_changes(&new, &old);
        assert!(changes.set().is_empty());
        assert_eq!(changes.unset(), &doc! { "skus.1": "" });
        assert_eq!(changes.pull_document(), Some(doc! { "$pull": { "skus": null } }));
    }

    #[test]
    fn test_numeric_keys_of_embedded_documents_do_not_schedule_pull() {
        let old = doc! { "stats": { "2020": 5, "2021": 7 } };
        let new = doc! { "stats": { "2021": 7 } };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.to_update_document(), doc! { "$unset": { "stats.2020": "" } });
        assert!(changes.pull_paths().is_empty());
        assert!(changes.pull_document().is_none());
    }

    #[test]
    fn test_nulled_element_inside_embedded_array_pulls_the_array() {
        let old = doc! { "years": { "2020": ["a", "b"] } };
        let new = doc! { "years": { "2020": [null, "b"] } };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.unset(), &doc! { "years.2020.0": "" });
        assert_eq!(changes.pull_document(), Some(doc! { "$pull": { "years.2020": null } }));
    }

    #[test]
    fn test_empty_array_over_filled_array_is_a_set() {
        let old = doc! { "tags": ["a"] };
        let new = doc! { "tags": [] };
        assert_eq!(calculate_changes(&new, &old).set(), &doc! { "tags": [] });

        let old = doc! { "tags": [] };
        assert!(calculate_changes(&new, &old).is_empty());
    }

    #[test]
    fn test_set_values_have_nulls_stripped() {
        let old = doc! { "name": "x" };
        let new = doc! { "name": "x", "meta": { "a": 1, "b": null }, "list": [1, null, 2] };

        let changes = calculate_changes(&new, &old);
        assert_eq!(changes.set(), &doc! { "meta": { "a": 1 }, "list": [1, 2] });
    }

    #[test]
    fn test_kind_change_is_a_set() {
        let old = doc! { "value": { "a": 1 } };
        let new = doc! { "value": [1] };
        assert_eq!(calculate_changes(&new, &old).set(), &doc! { "value": [1] });
    }
}
