use bson::{Bson, Document};
use indexmap::IndexMap;
use smol_str::SmolStr;

use super::EagerLoad;
use crate::error::{OdmError, OdmResult};
use crate::value::id_string;

/// Ids collected for one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedIds {
    /// Source key the ids were read from.
    pub key: String,
    /// Related model type tag.
    pub model: SmolStr,
    /// Ids keyed by their string form; the typed value is kept for the query.
    pub ids: IndexMap<String, Bson>,
}

impl ExtractedIds {
    /// Typed ids, in discovery order.
    pub fn values(&self) -> Vec<Bson> {
        self.ids.values().cloned().collect()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn add(&mut self, value: &Bson) {
        match value {
            Bson::Null => {}
            Bson::Array(items) => items.iter().for_each(|item| self.add(item)),
            other => {
                self.ids.entry(id_string(other)).or_insert_with(|| other.clone());
            }
        }
    }
}

/// Collects referenced ids from a batch of source documents.
#[derive(Debug, Clone, Default)]
pub struct RelationExtractor {
    related: IndexMap<SmolStr, ExtractedIds>,
}

impl RelationExtractor {
    /// Extractor for a set of eager loads.
    pub fn new(eager_loads: &IndexMap<SmolStr, EagerLoad>) -> Self {
        let related = eager_loads
            .iter()
            .map(|(name, load)| {
                (
                    name.clone(),
                    ExtractedIds {
                        key: load.key_path().to_string(),
                        model: SmolStr::new(load.model()),
                        ids: IndexMap::new(),
                    },
                )
            })
            .collect();
        Self { related }
    }

    /// Collect ids from one source document.
    ///
    /// A plain key missing from the document is an error: the relation cannot
    /// be satisfied. A dotted key whose embedded documents are missing simply
    /// contributes nothing.
    pub fn extract_from(&mut self, document: &Document) -> OdmResult<()> {
        for (name, extracted) in self.related.iter_mut() {
            let key = extracted.key.clone();
            match key.split_once('.') {
                Some((field, child_key)) => {
                    let children: Vec<&Document> = match document.get(field) {
                        Some(Bson::Array(items)) => items
                            .iter()
                            .filter_map(|item| match item {
                                Bson::Document(child) => Some(child),
                                _ => None,
                            })
                            .collect(),
                        Some(Bson::Document(child)) => vec![child],
                        _ => Vec::new(),
                    };
                    for child in children {
                        if let Some(value) = child.get(child_key) {
                            extracted.add(value);
                        }
                    }
                }
                None => {
                    let value = document.get(&key).ok_or_else(|| {
                        OdmError::eager_loader(format!(
                            "referenced key was not found on child model ({name}: '{key}')"
                        ))
                    })?;
                    extracted.add(value);
                }
            }
        }
        Ok(())
    }

    /// Ids collected for a relation.
    pub fn ids(&self, relation: &str) -> Option<&ExtractedIds> {
        self.related.get(relation)
    }

    /// Every relation with its collected ids.
    pub fn into_related(self) -> IndexMap<SmolStr, ExtractedIds> {
        self.related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    fn loads(key: &str) -> IndexMap<SmolStr, EagerLoad> {
        let mut loads = IndexMap::new();
        loads.insert(SmolStr::new("shops"), EagerLoad::new("Shop").key(key));
        loads
    }

    #[test]
    fn test_dotted_path_collects_child_keys() {
        let mut extractor = RelationExtractor::new(&loads("skus.shop_id"));
        extractor
            .extract_from(&doc! { "skus": [{ "shop_id": 10 }, { "shop_id": 20 }] })
            .unwrap();

        let ids = extractor.ids("shops").unwrap();
        assert_eq!(ids.values(), vec![Bson::Int32(10), Bson::Int32(20)]);
    }

    #[test]
    fn test_dotted_path_skips_missing_children() {
        let mut extractor = RelationExtractor::new(&loads("skus.shop_id"));
        extractor.extract_from(&doc! { "name": "no skus" }).unwrap();
        extractor.extract_from(&doc! { "skus": [{ "sku": "x" }, "junk"] }).unwrap();

        assert!(extractor.ids("shops").unwrap().is_empty());
    }

    #[test]
    fn test_missing_plain_key_is_an_error() {
        let mut extractor = RelationExtractor::new(&loads("nonexistent_field"));
        let err = extractor.extract_from(&doc! { "name": "x" }).unwrap_err();

        assert!(err.is_eager_loader());
        assert!(err.to_string().contains("referenced key was not found on child model"));
    }

    #[test]
    fn test_ids_are_deduplicated_and_keep_their_type() {
        let oid = ObjectId::new();
        let mut extractor = RelationExtractor::new(&loads("shop_ids"));
        extractor.extract_from(&doc! { "shop_ids": [oid, oid] }).unwrap();
        extractor.extract_from(&doc! { "shop_ids": [oid, 5] }).unwrap();

        let ids = extractor.ids("shops").unwrap();
        assert_eq!(ids.values(), vec![Bson::ObjectId(oid), Bson::Int32(5)]);
        assert!(ids.ids.contains_key(&oid.to_hex()));
    }

    #[test]
    fn test_null_reference_contributes_nothing() {
        let mut extractor = RelationExtractor::new(&loads("shop_id"));
        extractor.extract_from(&doc! { "shop_id": null }).unwrap();
        assert!(extractor.ids("shops").unwrap().is_empty());
    }
}
