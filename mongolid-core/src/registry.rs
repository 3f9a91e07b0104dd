//! Schema and model type registry.
//!
//! Schemas reference each other by name (`schema.Sku`) and are resolved by
//! lookup, so a schema may embed itself. Everything is validated once in
//! [`RegistryBuilder::build`]: unknown nested schemas, relation targets,
//! eager-load targets and cast identifiers fail there instead of at the first
//! write.
//!
//! ```rust
//! use mongolid_core::model::ModelType;
//! use mongolid_core::registry::Registry;
//! use mongolid_core::schema::Schema;
//!
//! let registry = Registry::builder()
//!     .schema(
//!         Schema::builder("Product")
//!             .collection("products")
//!             .field("skus", "schema.Sku")
//!             .build()
//!             .unwrap(),
//!     )
//!     .schema(Schema::builder("Sku").field("shop_id", "int").build().unwrap())
//!     .model_type(ModelType::builder("Product").cast("released_at", "datetime"))
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.model_type("Sku").is_ok());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::cast::{BackedEnum, Cast, CastResolver};
use crate::config::{DEFAULT_SOFT_DELETE_FIELD, OdmConfig};
use crate::error::{OdmError, OdmResult};
use crate::model::{Model, ModelType, ModelTypeBuilder};
use crate::schema::Schema;

/// Resolved schemas and model types, keyed by tag.
#[derive(Debug)]
pub struct Registry {
    schemas: HashMap<SmolStr, Arc<Schema>>,
    models: HashMap<SmolStr, Arc<ModelType>>,
    schema_models: HashMap<SmolStr, SmolStr>,
    casts: Arc<CastResolver>,
}

impl Registry {
    /// Create a registry builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Schema by name.
    pub fn schema(&self, name: &str) -> OdmResult<&Arc<Schema>> {
        self.schemas
            .get(name)
            .ok_or_else(|| OdmError::config(format!("unknown schema '{name}'")))
    }

    /// Model type by tag.
    pub fn model_type(&self, name: &str) -> OdmResult<&Arc<ModelType>> {
        self.models
            .get(name)
            .ok_or_else(|| OdmError::config(format!("unknown model type '{name}'")))
    }

    /// Model type assembled from documents of a schema.
    pub fn model_for_schema(&self, schema: &Schema) -> OdmResult<&Arc<ModelType>> {
        let tag = self
            .schema_models
            .get(schema.name())
            .map(SmolStr::as_str)
            .unwrap_or_else(|| schema.model());
        self.model_type(tag)
    }

    /// A new, empty model of a type.
    pub fn new_model(&self, name: &str) -> OdmResult<Model> {
        Ok(Model::new(Arc::clone(self.model_type(name)?)))
    }

    /// Cast resolver shared by every model type.
    pub fn casts(&self) -> &Arc<CastResolver> {
        &self.casts
    }

    /// Registered model type tags.
    pub fn model_types(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(SmolStr::as_str)
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder {
    schemas: Vec<Schema>,
    models: Vec<ModelTypeBuilder>,
    casts: Arc<CastResolver>,
    soft_delete_field: String,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
            models: Vec::new(),
            casts: Arc::new(CastResolver::new()),
            soft_delete_field: DEFAULT_SOFT_DELETE_FIELD.to_string(),
        }
    }

    /// Take defaults (the soft-delete field) from a configuration.
    pub fn config(mut self, config: &OdmConfig) -> Self {
        self.soft_delete_field = config.soft_delete_field.clone();
        self
    }

    /// Register a schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Register a model type.
    pub fn model_type(mut self, model_type: ModelTypeBuilder) -> Self {
        self.models.push(model_type);
        self
    }

    /// Use a shared cast resolver.
    pub fn cast_resolver(mut self, casts: Arc<CastResolver>) -> Self {
        self.casts = casts;
        self
    }

    /// Register a custom cast.
    pub fn register_cast(self, identifier: impl Into<SmolStr>, cast: Arc<dyn Cast>) -> Self {
        self.casts.register(identifier, cast);
        self
    }

    /// Register an enum cast under the enum's name.
    pub fn register_enum<E: BackedEnum>(self) -> Self {
        self.casts.register_enum::<E>();
        self
    }

    /// Resolve and validate everything.
    pub fn build(self) -> OdmResult<Registry> {
        let mut schemas: HashMap<SmolStr, Arc<Schema>> = HashMap::new();
        for schema in self.schemas {
            let name = SmolStr::new(schema.name());
            if schemas.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(OdmError::config(format!("schema '{name}' registered twice")));
            }
        }

        let mut models: HashMap<SmolStr, Arc<ModelType>> = HashMap::new();
        let mut schema_models: HashMap<SmolStr, SmolStr> = HashMap::new();

        for builder in self.models {
            let name = builder.name.clone();
            if models.contains_key(&name) {
                return Err(OdmError::config(format!("model type '{name}' registered twice")));
            }

            let schema_name = builder.schema_name();
            let schema = match (schemas.get(&schema_name), builder.schema.is_some()) {
                (Some(schema), _) => match &builder.collection {
                    Some(collection) => Arc::new(schema.with_collection(collection.clone())),
                    None => Arc::clone(schema),
                },
                (None, true) => {
                    return Err(OdmError::config(format!(
                        "model type '{name}' uses unknown schema '{schema_name}'"
                    )));
                }
                (None, false) => {
                    let schema = Arc::new(Schema::dynamic(name.clone(), builder.collection.clone()));
                    schemas.insert(schema_name.clone(), Arc::clone(&schema));
                    schema
                }
            };

            let mut casts: IndexMap<String, Arc<dyn Cast>> = IndexMap::new();
            for (field, identifier) in &builder.casts {
                casts.insert(field.clone(), self.casts.resolve(identifier)?);
            }

            schema_models.entry(schema_name).or_insert_with(|| name.clone());
            let model_type = builder.finish(schema, casts, &self.soft_delete_field);
            models.insert(name, Arc::new(model_type));
        }

        for schema in schemas.values() {
            let named = models
                .get(schema.model())
                .is_some_and(|model_type| model_type.schema().name() == schema.name());
            if named {
                schema_models.insert(SmolStr::new(schema.name()), SmolStr::new(schema.model()));
            }
        }

        // Schemas nobody declared a model type for still assemble into one.
        for schema in schemas.values() {
            let tag = match schema_models.get(schema.name()) {
                Some(tag) => tag.clone(),
                None => SmolStr::new(schema.model()),
            };
            if !models.contains_key(&tag) {
                let model_type = ModelType::builder(tag.clone())
                    .schema(schema.name())
                    .finish(Arc::clone(schema), IndexMap::new(), &self.soft_delete_field);
                models.insert(tag.clone(), Arc::new(model_type));
            }
            schema_models.entry(SmolStr::new(schema.name())).or_insert(tag);
        }

        for schema in schemas.values() {
            for nested in schema.nested_schemas() {
                if !schemas.contains_key(nested) {
                    return Err(OdmError::config(format!(
                        "schema '{}' embeds unknown schema '{nested}'",
                        schema.name()
                    )));
                }
            }
        }

        for model_type in models.values() {
            for relation in model_type.relations().values() {
                if !models.contains_key(relation.related()) {
                    return Err(OdmError::config(format!(
                        "relation '{}' of '{}' targets unknown model type '{}'",
                        relation.name(),
                        model_type.name(),
                        relation.related()
                    )));
                }
            }
            for (name, load) in model_type.eager_loads() {
                let related = models.get(load.model()).ok_or_else(|| {
                    OdmError::config(format!(
                        "eager load '{name}' of '{}' targets unknown model type '{}'",
                        model_type.name(),
                        load.model()
                    ))
                })?;
                related.collection()?;
            }
        }

        debug!(
            schemas = schemas.len(),
            models = models.len(),
            "Built model registry"
        );

        Ok(Registry {
            schemas,
            models,
            schema_models,
            casts: self.casts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eager::EagerLoad;

    fn sku_schema() -> Schema {
        Schema::builder("Sku").field("shop_id", "int").build().unwrap()
    }

    #[test]
    fn test_model_without_schema_gets_dynamic_schema() {
        let registry = Registry::builder()
            .model_type(ModelType::builder("Note").collection("notes"))
            .build()
            .unwrap();

        let note = registry.model_type("Note").unwrap();
        assert!(note.schema().is_dynamic());
        assert_eq!(note.collection().unwrap(), "notes");
        assert_eq!(registry.model_for_schema(note.schema()).unwrap().name(), "Note");
    }

    #[test]
    fn test_schema_without_model_type_gets_default_type() {
        let registry = Registry::builder().schema(sku_schema()).build().unwrap();
        let sku = registry.model_type("Sku").unwrap();
        assert!(!sku.schema().is_dynamic());
        assert!(registry.new_model("Sku").is_ok());
    }

    #[test]
    fn test_model_type_with_named_schema() {
        let schema = Schema::builder("UserSchema")
            .collection("users")
            .field("name", "string")
            .build()
            .unwrap();
        let registry = Registry::builder()
            .schema(schema)
            .model_type(ModelType::builder("User").schema("UserSchema"))
            .build()
            .unwrap();

        let user_schema = registry.schema("UserSchema").unwrap();
        assert_eq!(registry.model_for_schema(user_schema).unwrap().name(), "User");
    }

    #[test]
    fn test_collection_override() {
        let schema = Schema::builder("User").collection("users").build().unwrap();
        let registry = Registry::builder()
            .schema(schema)
            .model_type(ModelType::builder("User").collection("archived_users"))
            .build()
            .unwrap();

        assert_eq!(registry.model_type("User").unwrap().collection().unwrap(), "archived_users");
        assert_eq!(registry.schema("User").unwrap().collection().unwrap(), "users");
    }

    #[test]
    fn test_unknown_nested_schema_fails_fast() {
        let schema = Schema::builder("Product").field("skus", "schema.Sku").build().unwrap();
        let err = Registry::builder().schema(schema).build().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("Sku"));
    }

    #[test]
    fn test_unknown_cast_fails_fast() {
        let err = Registry::builder()
            .model_type(ModelType::builder("User").cast("balance", "money"))
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_unknown_relation_and_eager_targets_fail_fast() {
        let err = Registry::builder()
            .model_type(ModelType::builder("User").references_one("company", "Company", "company_id"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Company"));

        let err = Registry::builder()
            .model_type(ModelType::builder("User").with("company", EagerLoad::new("Company")))
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_eager_target_needs_a_collection() {
        let err = Registry::builder()
            .schema(sku_schema())
            .model_type(ModelType::builder("Product").collection("products").with("skus", EagerLoad::new("Sku")))
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_soft_delete_field_defaults_from_config() {
        let config = OdmConfig::builder().soft_delete_field("removed_at").build().unwrap();
        let registry = Registry::builder()
            .config(&config)
            .model_type(ModelType::builder("Post").soft_deletes())
            .model_type(ModelType::builder("Page").soft_delete_field("trashed_at"))
            .build()
            .unwrap();

        assert_eq!(registry.model_type("Post").unwrap().soft_delete_field(), Some("removed_at"));
        assert_eq!(registry.model_type("Page").unwrap().soft_delete_field(), Some("trashed_at"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = Registry::builder()
            .schema(sku_schema())
            .schema(sku_schema())
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }
}
