//! Document-backed models.
//!
//! A [`Model`] pairs the current attribute state with the snapshot last read
//! from or written to storage. The snapshot is the baseline for partial
//! updates and is always a value copy of the attributes, never shared.
//!
//! Behavior that differs between kinds of models (casts, soft deletes,
//! relations, polymorphism) lives on the [`ModelType`] a model points to.
//! Model types are declared with [`ModelType::builder`] and finalized by the
//! [`Registry`](crate::registry::Registry).

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;

use crate::cast::{BackedEnum, Cast};
use crate::eager::EagerLoad;
use crate::error::{OdmError, OdmResult};
use crate::relations::{Relation, RelationKind};
use crate::schema::{ID_FIELD, Schema};
use crate::value::documents_equal;

/// Picks the concrete model type for a set of attributes.
///
/// Lets one collection hold documents that assemble into behaviorally
/// different model types. Returning `None` (or the current type) keeps the
/// type the document was queried through.
pub trait Polymorphable: Send + Sync {
    /// Tag of the concrete model type for these attributes.
    fn resolve(&self, attributes: &Document) -> Option<SmolStr>;
}

impl<F> Polymorphable for F
where
    F: Fn(&Document) -> Option<SmolStr> + Send + Sync,
{
    fn resolve(&self, attributes: &Document) -> Option<SmolStr> {
        self(attributes)
    }
}

/// Behavior shared by every model of one kind.
pub struct ModelType {
    name: SmolStr,
    schema: Arc<Schema>,
    soft_delete_field: Option<String>,
    casts: IndexMap<String, Arc<dyn Cast>>,
    polymorph: Option<Arc<dyn Polymorphable>>,
    relations: IndexMap<SmolStr, Relation>,
    eager_loads: IndexMap<SmolStr, EagerLoad>,
}

impl ModelType {
    /// Declare a model type.
    pub fn builder(name: impl Into<SmolStr>) -> ModelTypeBuilder {
        ModelTypeBuilder::new(name)
    }

    /// Type tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema documents of this type are mapped with.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Collection name, or a configuration error for embedded-only types.
    pub fn collection(&self) -> OdmResult<&str> {
        self.schema.collection()
    }

    /// Deleted-at field, when the type soft-deletes.
    pub fn soft_delete_field(&self) -> Option<&str> {
        self.soft_delete_field.as_deref()
    }

    /// Whether the type soft-deletes.
    pub fn soft_deletes(&self) -> bool {
        self.soft_delete_field.is_some()
    }

    /// Cast declared for a field.
    pub fn cast(&self, field: &str) -> Option<&Arc<dyn Cast>> {
        self.casts.get(field)
    }

    /// Polymorphic resolver, if declared.
    pub fn polymorph(&self) -> Option<&Arc<dyn Polymorphable>> {
        self.polymorph.as_ref()
    }

    /// Declared relations.
    pub fn relations(&self) -> &IndexMap<SmolStr, Relation> {
        &self.relations
    }

    /// Relation by name.
    pub fn relation(&self, name: &str) -> OdmResult<&Relation> {
        self.relations.get(name).ok_or_else(|| {
            OdmError::config(format!("model '{}' declares no relation '{name}'", self.name))
        })
    }

    /// Relations prefetched whenever models of this type are queried.
    pub fn eager_loads(&self) -> &IndexMap<SmolStr, EagerLoad> {
        &self.eager_loads
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("schema", &self.schema.name())
            .field("soft_delete_field", &self.soft_delete_field)
            .field("casts", &self.casts.keys().collect::<Vec<_>>())
            .field("polymorphic", &self.polymorph.is_some())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("eager_loads", &self.eager_loads.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ModelType`].
pub struct ModelTypeBuilder {
    pub(crate) name: SmolStr,
    pub(crate) schema: Option<SmolStr>,
    pub(crate) collection: Option<String>,
    pub(crate) soft_delete: Option<Option<String>>,
    pub(crate) casts: Vec<(String, SmolStr)>,
    pub(crate) polymorph: Option<Arc<dyn Polymorphable>>,
    pub(crate) relations: IndexMap<SmolStr, Relation>,
    pub(crate) eager_loads: IndexMap<SmolStr, EagerLoad>,
}

impl ModelTypeBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            collection: None,
            soft_delete: None,
            casts: Vec::new(),
            polymorph: None,
            relations: IndexMap::new(),
            eager_loads: IndexMap::new(),
        }
    }

    /// Name of the schema to map with (defaults to the type name).
    pub fn schema(mut self, schema: impl Into<SmolStr>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Collection to persist to, overriding the schema's.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Soft-delete using the registry's default deleted-at field.
    pub fn soft_deletes(mut self) -> Self {
        self.soft_delete = Some(None);
        self
    }

    /// Soft-delete using a specific deleted-at field.
    pub fn soft_delete_field(mut self, field: impl Into<String>) -> Self {
        self.soft_delete = Some(Some(field.into()));
        self
    }

    /// Declare a cast for a field.
    pub fn cast(mut self, field: impl Into<String>, identifier: impl Into<SmolStr>) -> Self {
        self.casts.push((field.into(), identifier.into()));
        self
    }

    /// Declare polymorphic resolution.
    pub fn polymorph(mut self, resolver: impl Polymorphable + 'static) -> Self {
        self.polymorph = Some(Arc::new(resolver));
        self
    }

    /// Declare a relation.
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.insert(SmolStr::new(relation.name()), relation);
        self
    }

    /// Reference one model by id stored in `field`.
    pub fn references_one(
        self,
        name: impl Into<SmolStr>,
        related: impl Into<SmolStr>,
        field: impl Into<String>,
    ) -> Self {
        self.relation(Relation::new(name, RelationKind::ReferencesOne, related, field))
    }

    /// Reference many models by the id list stored in `field`.
    pub fn references_many(
        self,
        name: impl Into<SmolStr>,
        related: impl Into<SmolStr>,
        field: impl Into<String>,
    ) -> Self {
        self.relation(Relation::new(name, RelationKind::ReferencesMany, related, field))
    }

    /// Embed one document under `field`.
    pub fn embeds_one(
        self,
        name: impl Into<SmolStr>,
        related: impl Into<SmolStr>,
        field: impl Into<String>,
    ) -> Self {
        self.relation(Relation::new(name, RelationKind::EmbedsOne, related, field))
    }

    /// Embed a list of documents under `field`.
    pub fn embeds_many(
        self,
        name: impl Into<SmolStr>,
        related: impl Into<SmolStr>,
        field: impl Into<String>,
    ) -> Self {
        self.relation(Relation::new(name, RelationKind::EmbedsMany, related, field))
    }

    /// Prefetch a relation whenever models of this type are queried.
    pub fn with(mut self, name: impl Into<SmolStr>, eager_load: EagerLoad) -> Self {
        self.eager_loads.insert(name.into(), eager_load);
        self
    }

    pub(crate) fn schema_name(&self) -> SmolStr {
        self.schema.clone().unwrap_or_else(|| self.name.clone())
    }

    pub(crate) fn finish(
        self,
        schema: Arc<Schema>,
        casts: IndexMap<String, Arc<dyn Cast>>,
        default_soft_delete_field: &str,
    ) -> ModelType {
        ModelType {
            name: self.name,
            schema,
            soft_delete_field: self
                .soft_delete
                .map(|field| field.unwrap_or_else(|| default_soft_delete_field.to_string())),
            casts,
            polymorph: self.polymorph,
            relations: self.relations,
            eager_loads: self.eager_loads,
        }
    }
}

/// A document-backed model.
#[derive(Clone)]
pub struct Model {
    ty: Arc<ModelType>,
    attributes: Document,
    original: Document,
}

impl Model {
    /// A new, never persisted model.
    pub fn new(ty: Arc<ModelType>) -> Self {
        Self {
            ty,
            attributes: Document::new(),
            original: Document::new(),
        }
    }

    /// A model loaded from a stored document; the snapshot equals the document.
    pub fn from_document(ty: Arc<ModelType>, document: Document) -> Self {
        Self {
            ty,
            original: document.clone(),
            attributes: document,
        }
    }

    /// A new model filled from a serializable value.
    pub fn from_struct<T: Serialize>(ty: Arc<ModelType>, value: &T) -> OdmResult<Self> {
        let mut model = Self::new(ty);
        model.fill(bson::to_document(value)?);
        Ok(model)
    }

    /// Deserialize the current attributes into a typed struct.
    pub fn to_struct<T: DeserializeOwned>(&self) -> OdmResult<T> {
        bson::from_document(self.attributes.clone()).map_err(|e| OdmError::serialization(e.to_string()))
    }

    /// The model's type.
    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.ty
    }

    /// Current attributes.
    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    /// Consume the model, returning its attributes.
    pub fn into_attributes(self) -> Document {
        self.attributes
    }

    /// Snapshot taken at the last load or successful write.
    pub fn original_attributes(&self) -> &Document {
        &self.original
    }

    /// Raw attribute value.
    pub fn attribute(&self, field: &str) -> Option<&Bson> {
        self.attributes.get(field)
    }

    /// Attribute value passed through its cast, if one is declared.
    pub fn get(&self, field: &str) -> OdmResult<Option<Bson>> {
        let Some(value) = self.attributes.get(field).cloned() else {
            return Ok(None);
        };
        match self.ty.cast(field) {
            Some(cast) => cast.get(field, value).map(Some),
            None => Ok(Some(value)),
        }
    }

    /// Set an attribute, passing it through its cast first.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> OdmResult<()> {
        let field = field.into();
        let value = match self.ty.cast(&field) {
            Some(cast) => cast.set(&field, value.into())?,
            None => value.into(),
        };
        self.attributes.insert(field, value);
        Ok(())
    }

    /// Remove an attribute.
    pub fn unset(&mut self, field: &str) -> Option<Bson> {
        self.attributes.remove(field)
    }

    /// Merge raw attributes, bypassing casts.
    pub fn fill(&mut self, attributes: Document) {
        for (field, value) in attributes {
            self.attributes.insert(field, value);
        }
    }

    /// The id, when set and not null.
    pub fn id(&self) -> Option<&Bson> {
        self.attributes.get(ID_FIELD).filter(|id| !matches!(id, Bson::Null))
    }

    /// Set the id.
    pub fn set_id(&mut self, id: impl Into<Bson>) {
        self.attributes.insert(ID_FIELD, id.into());
    }

    /// Whether the attributes differ from the snapshot.
    pub fn is_dirty(&self) -> bool {
        !documents_equal(&self.attributes, &self.original)
    }

    /// Whether the model carries a deleted-at marker.
    pub fn is_trashed(&self) -> bool {
        self.ty
            .soft_delete_field()
            .and_then(|field| self.attributes.get(field))
            .is_some_and(|value| !matches!(value, Bson::Null))
    }

    /// Attribute read as a UTC datetime.
    pub fn get_datetime(&self, field: &str) -> OdmResult<Option<DateTime<Utc>>> {
        match self.get(field)? {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::DateTime(dt)) => Ok(Some(dt.to_chrono())),
            Some(other) => Err(OdmError::invalid_type(
                field,
                format!("expected a datetime, got {:?}", other.element_type()),
            )),
        }
    }

    /// Attribute read as an enum case.
    pub fn get_enum<E: BackedEnum>(&self, field: &str) -> OdmResult<Option<E>> {
        match self.get(field)? {
            None | Some(Bson::Null) => Ok(None),
            Some(value) => E::from_value(&value).map(Some).ok_or_else(|| {
                OdmError::invalid_type(field, format!("{value} is not a valid {}", E::NAME))
            }),
        }
    }

    /// Set an attribute to an enum case.
    pub fn set_enum<E: BackedEnum>(&mut self, field: impl Into<String>, case: E) -> OdmResult<()> {
        self.set(field, case.value())
    }

    /// Take a value copy of the attributes as the new snapshot.
    pub(crate) fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    pub(crate) fn replace_attributes(&mut self, attributes: Document) {
        self.attributes = attributes;
    }

    /// Re-instantiate as another type with the same attributes.
    pub(crate) fn into_type(self, ty: Arc<ModelType>) -> Self {
        Self {
            ty,
            attributes: self.attributes,
            original: self.original,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.ty.name())
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::DateTimeCast;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn user_type() -> Arc<ModelType> {
        let schema = Arc::new(Schema::dynamic("User", Some("users".into())));
        let mut casts: IndexMap<String, Arc<dyn Cast>> = IndexMap::new();
        casts.insert("birthdate".into(), Arc::new(DateTimeCast));
        Arc::new(
            ModelType::builder("User")
                .soft_deletes()
                .finish(schema, casts, "deleted_at"),
        )
    }

    #[test]
    fn test_new_model_is_empty() {
        let model = Model::new(user_type());
        assert!(model.attributes().is_empty());
        assert!(model.id().is_none());
        assert!(!model.is_dirty());
    }

    #[test]
    fn test_set_marks_dirty_and_snapshot_is_a_copy() {
        let mut model = Model::from_document(user_type(), doc! { "name": "John" });
        assert!(!model.is_dirty());

        model.set("name", "Jane").unwrap();
        assert!(model.is_dirty());
        assert_eq!(model.original_attributes(), &doc! { "name": "John" });

        model.sync_original();
        model.set("name", "Jim").unwrap();
        assert_eq!(model.original_attributes(), &doc! { "name": "Jane" });
    }

    #[test]
    fn test_cast_applied_on_set_and_get() {
        let mut model = Model::new(user_type());
        model.set("birthdate", "2000-01-01T00:00:00Z").unwrap();

        assert!(matches!(model.attribute("birthdate"), Some(Bson::DateTime(_))));
        let birthdate = model.get_datetime("birthdate").unwrap().unwrap();
        assert_eq!(birthdate.to_rfc3339(), "2000-01-01T00:00:00+00:00");

        assert!(model.set("birthdate", true).unwrap_err().is_invalid_type());
    }

    #[test]
    fn test_null_id_is_absent() {
        let mut model = Model::new(user_type());
        model.set_id(Bson::Null);
        assert!(model.id().is_none());
        model.set_id(10);
        assert_eq!(model.id(), Some(&Bson::Int32(10)));
    }

    #[test]
    fn test_is_trashed() {
        let mut model = Model::new(user_type());
        assert!(!model.is_trashed());
        model.set("deleted_at", bson::DateTime::now()).unwrap();
        assert!(model.is_trashed());
    }

    #[test]
    fn test_struct_conversion() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct User {
            name: String,
            age: i32,
        }

        let model = Model::from_struct(user_type(), &User { name: "Ann".into(), age: 31 }).unwrap();
        assert_eq!(model.attribute("age"), Some(&Bson::Int32(31)));

        let user: User = model.to_struct().unwrap();
        assert_eq!(user, User { name: "Ann".into(), age: 31 });
    }
}
