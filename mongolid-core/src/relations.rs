//! Relations between models.
//!
//! References store the related id (or a list of ids) in a field of the
//! parent; embeds store the related documents themselves. Reference lookups
//! consult the cache first, where [`EagerLoadCache`](crate::eager::EagerLoadCache)
//! leaves prefetched documents under `"{collection}:{id}"`.

use std::sync::Arc;

use bson::{Bson, Document, doc};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::backend::FindOptions;
use crate::cache::CacheKey;
use crate::context::Context;
use crate::error::{OdmError, OdmResult};
use crate::model::{Model, ModelType};
use crate::query;
use crate::schema::ID_FIELD;
use crate::value::{id_string, is_blank};

/// Kind of relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The parent holds one related id.
    ReferencesOne,
    /// The parent holds a list of related ids.
    ReferencesMany,
    /// The parent holds one related document.
    EmbedsOne,
    /// The parent holds a list of related documents.
    EmbedsMany,
}

impl RelationKind {
    /// Whether the related documents live in their own collection.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::ReferencesOne | Self::ReferencesMany)
    }

    /// Whether the relation holds a list.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::ReferencesMany | Self::EmbedsMany)
    }
}

/// Result of resolving a relation.
#[derive(Debug, Clone)]
pub enum Related {
    /// A single-valued relation.
    One(Option<Model>),
    /// A list-valued relation.
    Many(Vec<Model>),
}

impl Related {
    /// The related model of a single-valued relation, or the first of a list.
    pub fn into_one(self) -> Option<Model> {
        match self {
            Self::One(model) => model,
            Self::Many(models) => models.into_iter().next(),
        }
    }

    /// Every related model.
    pub fn into_many(self) -> Vec<Model> {
        match self {
            Self::One(model) => model.into_iter().collect(),
            Self::Many(models) => models,
        }
    }
}

/// A declared relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    name: SmolStr,
    kind: RelationKind,
    related: SmolStr,
    field: String,
    key: String,
}

impl Relation {
    /// Declare a relation named `name` to models of type `related`, stored
    /// under `field` of the parent.
    pub fn new(
        name: impl Into<SmolStr>,
        kind: RelationKind,
        related: impl Into<SmolStr>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            related: related.into(),
            field: field.into(),
            key: ID_FIELD.to_string(),
        }
    }

    /// Field of the related model the stored references point at.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relation kind.
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Related model type tag.
    pub fn related(&self) -> &str {
        &self.related
    }

    /// Parent field holding the reference or embedded documents.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Related field referenced by the stored values.
    pub fn referenced_key(&self) -> &str {
        &self.key
    }

    /// Resolve the relation for a parent model.
    pub async fn get(&self, context: &Context, parent: &Model) -> OdmResult<Related> {
        let related = context.registry().model_type(&self.related)?;
        let value = parent.attribute(&self.field).cloned().unwrap_or(Bson::Null);

        match self.kind {
            RelationKind::ReferencesOne => {
                if is_blank(&value) {
                    return Ok(Related::One(None));
                }
                let found = self.fetch(context, related, vec![value]).await?;
                Ok(Related::One(found.into_iter().next()))
            }
            RelationKind::ReferencesMany => {
                let ids = match value {
                    Bson::Array(ids) => ids,
                    Bson::Null => Vec::new(),
                    other => vec![other],
                };
                Ok(Related::Many(self.fetch(context, related, ids).await?))
            }
            RelationKind::EmbedsOne => {
                let document = match value {
                    Bson::Document(document) => Some(document),
                    Bson::Array(items) => items.into_iter().find_map(|item| match item {
                        Bson::Document(document) => Some(document),
                        _ => None,
                    }),
                    _ => None,
                };
                let model = match document {
                    Some(document) => context.assembler().assemble(document, related.schema())?,
                    None => None,
                };
                Ok(Related::One(model))
            }
            RelationKind::EmbedsMany => {
                let documents: Vec<Document> = match value {
                    Bson::Array(items) => items
                        .into_iter()
                        .filter_map(|item| match item {
                            Bson::Document(document) => Some(document),
                            _ => None,
                        })
                        .collect(),
                    Bson::Document(document) => vec![document],
                    _ => Vec::new(),
                };
                Ok(Related::Many(
                    context.assembler().assemble_all(documents, related.schema())?,
                ))
            }
        }
    }

    /// Fetch referenced models in reference order, cache first.
    async fn fetch(&self, context: &Context, related: &Arc<ModelType>, ids: Vec<Bson>) -> OdmResult<Vec<Model>> {
        let collection_name = related.collection()?;
        let by_id = self.key == ID_FIELD;
        let mut found: Vec<(String, Document)> = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids.iter().filter(|id| !matches!(id, Bson::Null)) {
            if by_id {
                match context.cache().get(&CacheKey::document(collection_name, id)).await {
                    Ok(Some(document)) => {
                        found.push((id_string(id), document));
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => warn!(relation = %self.name, error = %err, "Cache read failed, querying storage"),
                }
            }
            missing.push(id.clone());
        }

        if !missing.is_empty() {
            debug!(relation = %self.name, ids = missing.len(), "Querying referenced models");
            let mut filter = Document::new();
            filter.insert(self.key.clone(), doc! { "$in": missing });
            let filter = query::resolve(filter, related, false);
            let documents = context
                .connection()
                .collection(collection_name)
                .find(filter, &FindOptions::default())
                .await?;
            for document in documents {
                if let Some(key) = document.get(&self.key).map(id_string) {
                    found.push((key, document));
                }
            }
        }

        let assembler = context.assembler();
        let mut models = Vec::with_capacity(found.len());
        for id in &ids {
            let id = id_string(id);
            let Some(position) = found.iter().position(|(found_id, _)| *found_id == id) else {
                continue;
            };
            let (_, document) = found.swap_remove(position);
            if let Some(model) = assembler.assemble(document, related.schema())? {
                models.push(model);
            }
        }
        Ok(models)
    }

    /// Reference a related model from the parent. The related model must
    /// have been persisted.
    pub fn attach(&self, parent: &mut Model, related: &Model) -> OdmResult<()> {
        self.expect_reference("attach")?;
        let id = related.attribute(&self.key).cloned().ok_or_else(|| {
            OdmError::config(format!(
                "cannot attach to '{}': related model has no '{}'",
                self.name, self.key
            ))
        })?;

        if self.kind == RelationKind::ReferencesOne {
            parent.set(self.field.clone(), id)?;
            return Ok(());
        }
        let mut ids = self.current_list(parent);
        let key = id_string(&id);
        if !ids.iter().any(|existing| id_string(existing) == key) {
            ids.push(id);
        }
        parent.set(self.field.clone(), ids)
    }

    /// Stop referencing a related model.
    pub fn detach(&self, parent: &mut Model, related: &Model) -> OdmResult<()> {
        self.expect_reference("detach")?;
        let Some(id) = related.attribute(&self.key) else {
            return Ok(());
        };
        let key = id_string(id);

        if self.kind == RelationKind::ReferencesOne {
            if parent.attribute(&self.field).is_some_and(|current| id_string(current) == key) {
                parent.unset(&self.field);
            }
            return Ok(());
        }
        let ids: Vec<Bson> = self
            .current_list(parent)
            .into_iter()
            .filter(|existing| id_string(existing) != key)
            .collect();
        parent.set(self.field.clone(), ids)
    }

    /// Embed a related model in the parent. An embedded document with the
    /// same id is replaced.
    pub fn add(&self, parent: &mut Model, related: &Model) -> OdmResult<()> {
        self.expect_embed("add")?;
        let document = related.attributes().clone();

        if self.kind == RelationKind::EmbedsOne {
            parent.set(self.field.clone(), document)?;
            return Ok(());
        }
        let mut items = self.current_list(parent);
        match related.id().map(id_string) {
            Some(id) => match items.iter().position(|item| embedded_id(item).as_deref() == Some(id.as_str())) {
                Some(position) => items[position] = Bson::Document(document),
                None => items.push(Bson::Document(document)),
            },
            None => items.push(Bson::Document(document)),
        }
        parent.set(self.field.clone(), items)
    }

    /// Remove an embedded model, matched by id.
    pub fn remove(&self, parent: &mut Model, related: &Model) -> OdmResult<()> {
        self.expect_embed("remove")?;
        let id = related.id().map(id_string);

        if self.kind == RelationKind::EmbedsOne {
            let current = parent.attribute(&self.field).and_then(embedded_id);
            if id.is_none() || current == id {
                parent.unset(&self.field);
            }
            return Ok(());
        }
        let Some(id) = id else {
            return Ok(());
        };
        let items: Vec<Bson> = self
            .current_list(parent)
            .into_iter()
            .filter(|item| embedded_id(item).as_deref() != Some(id.as_str()))
            .collect();
        parent.set(self.field.clone(), items)
    }

    fn current_list(&self, parent: &Model) -> Vec<Bson> {
        match parent.attribute(&self.field) {
            Some(Bson::Array(items)) => items.clone(),
            Some(Bson::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }

    fn expect_reference(&self, operation: &str) -> OdmResult<()> {
        if self.kind.is_reference() {
            return Ok(());
        }
        Err(OdmError::config(format!(
            "cannot {operation} on embedded relation '{}'",
            self.name
        )))
    }

    fn expect_embed(&self, operation: &str) -> OdmResult<()> {
        if !self.kind.is_reference() {
            return Ok(());
        }
        Err(OdmError::config(format!(
            "cannot {operation} on reference relation '{}'",
            self.name
        )))
    }
}

fn embedded_id(value: &Bson) -> Option<String> {
    match value {
        Bson::Document(document) => document.get(ID_FIELD).map(id_string),
        _ => None,
    }
}
