//! Query results.

use std::collections::VecDeque;
use std::sync::Arc;

use bson::Document;

use crate::assembler::EntityAssembler;
use crate::error::OdmResult;
use crate::model::Model;
use crate::registry::Registry;
use crate::schema::Schema;

/// Documents returned by a query, assembled into models as they are read.
///
/// Documents that assemble into nothing (empty documents) are skipped.
pub struct Cursor {
    registry: Arc<Registry>,
    schema: Arc<Schema>,
    documents: VecDeque<Document>,
}

impl Cursor {
    /// Cursor over fetched documents.
    pub fn new(registry: Arc<Registry>, schema: Arc<Schema>, documents: Vec<Document>) -> Self {
        Self {
            registry,
            schema,
            documents: documents.into(),
        }
    }

    /// Documents not yet read.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether every document has been read.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Remaining documents, unassembled.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// First model.
    pub fn first(mut self) -> OdmResult<Option<Model>> {
        self.next().transpose()
    }

    /// Every model.
    pub fn all(self) -> OdmResult<Vec<Model>> {
        self.collect()
    }
}

impl Iterator for Cursor {
    type Item = OdmResult<Model>;

    fn next(&mut self) -> Option<Self::Item> {
        let assembler = EntityAssembler::new(&self.registry);
        while let Some(document) = self.documents.pop_front() {
            match assembler.assemble(document, &self.schema) {
                Ok(Some(model)) => return Some(Ok(model)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.documents.len()))
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("schema", &self.schema.name())
            .field("remaining", &self.documents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelType;
    use bson::{Bson, doc};
    use pretty_assertions::assert_eq;

    fn cursor(documents: Vec<Document>) -> Cursor {
        let registry = Arc::new(
            Registry::builder()
                .model_type(ModelType::builder("Note").collection("notes"))
                .build()
                .unwrap(),
        );
        let schema = Arc::clone(registry.model_type("Note").unwrap().schema());
        Cursor::new(registry, schema, documents)
    }

    #[test]
    fn test_iterates_models_skipping_empty_documents() {
        let cursor = cursor(vec![doc! { "_id": 1 }, doc! {}, doc! { "_id": 2 }]);
        assert_eq!(cursor.len(), 3);

        let ids: Vec<Bson> = cursor.map(|model| model.unwrap().id().cloned().unwrap()).collect();
        assert_eq!(ids, vec![Bson::Int32(1), Bson::Int32(2)]);
    }

    #[test]
    fn test_first_and_all() {
        assert!(cursor(Vec::new()).first().unwrap().is_none());
        assert_eq!(cursor(vec![doc! { "_id": 1 }]).first().unwrap().unwrap().id(), Some(&Bson::Int32(1)));
        assert_eq!(cursor(vec![doc! { "_id": 1 }, doc! { "_id": 2 }]).all().unwrap().len(), 2);
    }
}
