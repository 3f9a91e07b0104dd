//! Document to model assembly.

use std::sync::Arc;

use bson::{Bson, Document};
use tracing::debug;

use crate::error::OdmResult;
use crate::model::Model;
use crate::registry::Registry;
use crate::schema::{FieldType, Schema};
use crate::value::is_blank;

/// Builds models from stored documents.
pub struct EntityAssembler<'a> {
    registry: &'a Registry,
}

impl<'a> EntityAssembler<'a> {
    /// Create an assembler.
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Assemble a model from a document.
    ///
    /// Embedded documents are assembled through their own schema. Polymorphic
    /// types may hand the attributes to a different concrete type. Returns
    /// `None` when nothing is left to assemble.
    pub fn assemble(&self, document: Document, schema: &Schema) -> OdmResult<Option<Model>> {
        let mut attributes = Document::new();
        for (field, value) in document {
            match schema.field_type(&field).and_then(FieldType::schema_name) {
                Some(nested) => {
                    if let Some(value) = self.assemble_embedded(value, nested)? {
                        attributes.insert(field, value);
                    }
                }
                None => {
                    attributes.insert(field, value);
                }
            }
        }

        if attributes.is_empty() {
            return Ok(None);
        }

        let model_type = self.registry.model_for_schema(schema)?;
        let model = Model::from_document(Arc::clone(model_type), attributes);

        let Some(concrete) = model_type
            .polymorph()
            .and_then(|polymorph| polymorph.resolve(model.attributes()))
        else {
            return Ok(Some(model));
        };
        if concrete == model_type.name() {
            return Ok(Some(model));
        }

        debug!(from = %model_type.name(), to = %concrete, "Resolved polymorphic model");
        let concrete = self.registry.model_type(&concrete)?;
        Ok(Some(model.into_type(Arc::clone(concrete))))
    }

    fn assemble_embedded(&self, value: Bson, schema_name: &str) -> OdmResult<Option<Bson>> {
        if is_blank(&value) {
            return Ok(None);
        }
        let schema = self.registry.schema(schema_name)?;

        let (items, single) = match value {
            Bson::Array(items) => (items, false),
            Bson::Document(doc) => (vec![Bson::Document(doc)], true),
            other => return Ok(Some(other)),
        };

        let mut assembled = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Bson::Document(doc) => {
                    if let Some(model) = self.assemble(doc, schema)? {
                        assembled.push(Bson::Document(model.into_attributes()));
                    }
                }
                Bson::Null => {}
                other => assembled.push(other),
            }
        }

        if assembled.is_empty() {
            return Ok(None);
        }
        if single {
            return Ok(assembled.into_iter().next());
        }
        Ok(Some(Bson::Array(assembled)))
    }

    /// Assemble every document, skipping empty ones.
    pub fn assemble_all(&self, documents: Vec<Document>, schema: &Schema) -> OdmResult<Vec<Model>> {
        let mut models = Vec::with_capacity(documents.len());
        for document in documents {
            if let Some(model) = self.assemble(document, schema)? {
                models.push(model);
            }
        }
        Ok(models)
    }
}
