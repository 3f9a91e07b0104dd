//! Declarative document shapes.
//!
//! A [`Schema`] maps field names to [`FieldType`]s. Field types are written as
//! tags, the same way they would appear in a schema definition:
//!
//! | Tag                   | Meaning                                          |
//! |-----------------------|--------------------------------------------------|
//! | `int`, `bool`, `float`, `string` | primitive cast                        |
//! | `objectId`            | generate or convert to a native ObjectId         |
//! | `sequence`            | auto-increment counter keyed by collection name  |
//! | `createdAtTimestamp`  | set once, kept if already a native timestamp     |
//! | `updatedAtTimestamp`  | refreshed on every write                         |
//! | `schema.<Name>`       | embedded document(s) mapped by another schema    |
//!
//! ```rust
//! use mongolid_core::schema::Schema;
//!
//! let schema = Schema::builder("Product")
//!     .collection("products")
//!     .field("name", "string")
//!     .field("price", "float")
//!     .field("skus", "schema.Sku")
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.is_declared("_id"));
//! assert!(schema.is_declared("updated_at"));
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{OdmError, OdmResult};

/// Field holding the document identity.
pub const ID_FIELD: &str = "_id";

/// Field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";

/// Field holding the last-update timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";

const SCHEMA_PREFIX: &str = "schema.";

/// Primitive casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// 64-bit integer.
    Int,
    /// Boolean.
    Bool,
    /// Double.
    Float,
    /// UTF-8 string.
    String,
}

/// How a field's value is coerced before it is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Standard type cast.
    Primitive(Primitive),
    /// Native ObjectId, generated when missing.
    ObjectId,
    /// Auto-increment integer, fetched when missing.
    Sequence,
    /// Creation timestamp.
    CreatedAtTimestamp,
    /// Update timestamp.
    UpdatedAtTimestamp,
    /// Embedded document(s) described by the named schema.
    Schema(SmolStr),
}

impl FieldType {
    /// Name of the embedded schema, if this is a nested-schema reference.
    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Self::Schema(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl FromStr for FieldType {
    type Err = OdmError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let field_type = match tag {
            "int" => Self::Primitive(Primitive::Int),
            "bool" => Self::Primitive(Primitive::Bool),
            "float" => Self::Primitive(Primitive::Float),
            "string" => Self::Primitive(Primitive::String),
            "objectId" => Self::ObjectId,
            "sequence" => Self::Sequence,
            "createdAtTimestamp" => Self::CreatedAtTimestamp,
            "updatedAtTimestamp" => Self::UpdatedAtTimestamp,
            other => match other.strip_prefix(SCHEMA_PREFIX) {
                Some(name) if !name.is_empty() => Self::Schema(SmolStr::new(name)),
                _ => {
                    return Err(OdmError::config(format!("unknown field type tag '{other}'")));
                }
            },
        };
        Ok(field_type)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(Primitive::Int) => f.write_str("int"),
            Self::Primitive(Primitive::Bool) => f.write_str("bool"),
            Self::Primitive(Primitive::Float) => f.write_str("float"),
            Self::Primitive(Primitive::String) => f.write_str("string"),
            Self::ObjectId => f.write_str("objectId"),
            Self::Sequence => f.write_str("sequence"),
            Self::CreatedAtTimestamp => f.write_str("createdAtTimestamp"),
            Self::UpdatedAtTimestamp => f.write_str("updatedAtTimestamp"),
            Self::Schema(name) => write!(f, "{SCHEMA_PREFIX}{name}"),
        }
    }
}

/// Description of a document shape.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: SmolStr,
    model: SmolStr,
    collection: Option<String>,
    dynamic: bool,
    timestamps: bool,
    fields: IndexMap<String, FieldType>,
}

impl Schema {
    /// Create a builder for a schema. The schema name doubles as the model tag
    /// unless [`SchemaBuilder::model`] says otherwise.
    pub fn builder(name: impl Into<SmolStr>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Schema used for models that declare no fields: id, timestamps, and
    /// every other attribute kept verbatim.
    pub fn dynamic(name: impl Into<SmolStr>, collection: Option<String>) -> Self {
        let name = name.into();
        let mut fields = IndexMap::new();
        fields.insert(ID_FIELD.to_string(), FieldType::ObjectId);
        fields.insert(CREATED_AT_FIELD.to_string(), FieldType::CreatedAtTimestamp);
        fields.insert(UPDATED_AT_FIELD.to_string(), FieldType::UpdatedAtTimestamp);
        Self {
            model: name.clone(),
            name,
            collection,
            dynamic: true,
            timestamps: true,
            fields,
        }
    }

    /// Schema name, referenced by `schema.<name>` tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag of the model type assembled from documents of this shape.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Collection name, if the schema is persisted on its own.
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Collection name, or a configuration error for embedded-only schemas.
    pub fn collection(&self) -> OdmResult<&str> {
        self.collection_name()
            .ok_or_else(|| OdmError::config(format!("schema '{}' has no collection name", self.name)))
    }

    /// Copy of this schema targeting another collection.
    pub fn with_collection(&self, collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..self.clone()
        }
    }

    /// Whether undeclared fields are kept.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether `created_at` / `updated_at` are managed.
    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &IndexMap<String, FieldType> {
        &self.fields
    }

    /// Type declared for a field.
    pub fn field_type(&self, field: &str) -> Option<&FieldType> {
        self.fields.get(field)
    }

    /// Whether a field is declared (or always kept).
    pub fn is_declared(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Names of every schema this one embeds.
    pub fn nested_schemas(&self) -> impl Iterator<Item = &str> {
        self.fields.values().filter_map(FieldType::schema_name)
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: SmolStr,
    model: Option<SmolStr>,
    collection: Option<String>,
    dynamic: bool,
    timestamps: bool,
    fields: Vec<(String, String)>,
}

impl SchemaBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            model: None,
            collection: None,
            dynamic: false,
            timestamps: true,
            fields: Vec::new(),
        }
    }

    /// Set the model tag produced by assembly.
    pub fn model(mut self, model: impl Into<SmolStr>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Keep undeclared fields.
    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Enable or disable timestamp management.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Declare a field by type tag.
    pub fn field(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.fields.push((name.into(), tag.into()));
        self
    }

    /// Build the schema, failing on unknown type tags.
    pub fn build(self) -> OdmResult<Schema> {
        if self.name.is_empty() {
            return Err(OdmError::config("schema name is required"));
        }

        let mut fields = IndexMap::new();
        fields.insert(ID_FIELD.to_string(), FieldType::ObjectId);

        for (field, tag) in self.fields {
            let field_type = tag.parse::<FieldType>().map_err(|_| {
                OdmError::config(format!(
                    "unknown field type tag '{tag}' for field '{field}' in schema '{}'",
                    self.name
                ))
            })?;
            fields.insert(field, field_type);
        }

        if self.timestamps {
            fields
                .entry(CREATED_AT_FIELD.to_string())
                .or_insert(FieldType::CreatedAtTimestamp);
            fields
                .entry(UPDATED_AT_FIELD.to_string())
                .or_insert(FieldType::UpdatedAtTimestamp);
        }

        Ok(Schema {
            model: self.model.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            collection: self.collection,
            dynamic: self.dynamic,
            timestamps: self.timestamps,
            fields,
        })
    }
}
