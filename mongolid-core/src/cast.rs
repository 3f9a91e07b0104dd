//! Attribute casts.
//!
//! A cast converts an attribute between its stored form and the form the
//! application reads and writes. Casts are declared per model type by
//! identifier and resolved through a [`CastResolver`], which memoizes the
//! resolved caster for each identifier.
//!
//! Built-in identifiers:
//!
//! - `datetime`, aliased as `immutable_datetime`: native BSON timestamps.
//!   Writes accept a native timestamp, an RFC 3339 string or epoch
//!   milliseconds and always store a native timestamp. BSON timestamps are
//!   plain values, so both identifiers resolve to [`DateTimeCast`].
//! - `uuid`: UUID strings stored as BSON binary (subtype 4).
//!
//! Enum casts are registered from any [`BackedEnum`] implementor under the
//! enum's name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{Binary, Bson, spec::BinarySubtype};
use chrono::DateTime;
use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::debug;
use uuid::Uuid;

use crate::error::{OdmError, OdmResult};
use crate::value::values_equal;

/// Converts a single attribute between stored and application form.
pub trait Cast: Send + Sync + fmt::Debug {
    /// Stored value to application value.
    fn get(&self, field: &str, value: Bson) -> OdmResult<Bson>;

    /// Application value to stored value.
    fn set(&self, field: &str, value: Bson) -> OdmResult<Bson>;
}

/// Cast for native timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTimeCast;

impl Cast for DateTimeCast {
    fn get(&self, _field: &str, value: Bson) -> OdmResult<Bson> {
        Ok(value)
    }

    fn set(&self, field: &str, value: Bson) -> OdmResult<Bson> {
        match value {
            Bson::Null | Bson::DateTime(_) => Ok(value),
            Bson::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt)))
                .map_err(|e| OdmError::invalid_type(field, format!("invalid datetime '{s}': {e}"))),
            Bson::Int64(ms) => Ok(Bson::DateTime(bson::DateTime::from_millis(ms))),
            Bson::Int32(ms) => Ok(Bson::DateTime(bson::DateTime::from_millis(i64::from(ms)))),
            other => Err(OdmError::invalid_type(
                field,
                format!("expected a datetime, got {:?}", other.element_type()),
            )),
        }
    }
}

/// Cast storing UUID strings as BSON binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UuidCast;

impl Cast for UuidCast {
    fn get(&self, _field: &str, value: Bson) -> OdmResult<Bson> {
        if let Bson::Binary(binary) = &value {
            if binary.subtype == BinarySubtype::Uuid {
                if let Ok(bytes) = <[u8; 16]>::try_from(binary.bytes.as_slice()) {
                    return Ok(Bson::String(Uuid::from_bytes(bytes).to_string()));
                }
            }
        }
        Ok(value)
    }

    fn set(&self, field: &str, value: Bson) -> OdmResult<Bson> {
        match value {
            Bson::Null => Ok(Bson::Null),
            Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => Ok(Bson::Binary(binary)),
            Bson::String(s) => {
                let uuid = Uuid::parse_str(&s)
                    .map_err(|e| OdmError::invalid_type(field, format!("invalid uuid '{s}': {e}")))?;
                Ok(Bson::Binary(Binary {
                    subtype: BinarySubtype::Uuid,
                    bytes: uuid.as_bytes().to_vec(),
                }))
            }
            other => Err(OdmError::invalid_type(
                field,
                format!("expected a uuid, got {:?}", other.element_type()),
            )),
        }
    }
}

/// An enum backed by scalar values.
///
/// ```rust
/// use bson::Bson;
/// use mongolid_core::cast::BackedEnum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Size { Small, Big }
///
/// impl BackedEnum for Size {
///     const NAME: &'static str = "Size";
///
///     fn cases() -> &'static [Self] {
///         &[Size::Small, Size::Big]
///     }
///
///     fn value(&self) -> Bson {
///         match self {
///             Size::Small => Bson::String("small".into()),
///             Size::Big => Bson::String("big".into()),
///         }
///     }
/// }
///
/// assert_eq!(Size::from_value(&Bson::String("big".into())), Some(Size::Big));
/// ```
pub trait BackedEnum: Sized + Copy + Send + Sync + 'static {
    /// Identifier the enum cast is registered under.
    const NAME: &'static str;

    /// Every case of the enum.
    fn cases() -> &'static [Self];

    /// Backing value of this case.
    fn value(&self) -> Bson;

    /// Case backed by the given value.
    fn from_value(value: &Bson) -> Option<Self> {
        Self::cases()
            .iter()
            .copied()
            .find(|case| values_equal(&case.value(), value))
    }
}

/// Cast restricting an attribute to the backing values of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct BackedEnumCast {
    name: &'static str,
    cases: Vec<Bson>,
}

impl BackedEnumCast {
    /// Build the cast for an enum type.
    pub fn of<E: BackedEnum>() -> Self {
        Self {
            name: E::NAME,
            cases: E::cases().iter().map(BackedEnum::value).collect(),
        }
    }

    /// Enum name.
    pub fn name(&self) -> &str {
        self.name
    }

    fn find(&self, value: &Bson) -> Option<&Bson> {
        self.cases.iter().find(|case| values_equal(case, value))
    }
}

impl Cast for BackedEnumCast {
    fn get(&self, field: &str, value: Bson) -> OdmResult<Bson> {
        if matches!(value, Bson::Null) {
            return Ok(Bson::Null);
        }
        self.find(&value).cloned().ok_or_else(|| {
            OdmError::invalid_type(field, format!("{value} is not a valid backing value for {}", self.name))
        })
    }

    fn set(&self, field: &str, value: Bson) -> OdmResult<Bson> {
        if matches!(value, Bson::Null) {
            return Ok(Bson::Null);
        }
        self.find(&value).cloned().ok_or_else(|| {
            OdmError::invalid_type(field, format!("value must be an instance of {}", self.name))
        })
    }
}

/// Resolves cast identifiers, caching each resolved caster.
#[derive(Debug, Default)]
pub struct CastResolver {
    resolved: RwLock<HashMap<SmolStr, Arc<dyn Cast>>>,
}

impl CastResolver {
    /// Create a resolver knowing only the built-in casts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom caster under an identifier.
    pub fn register(&self, identifier: impl Into<SmolStr>, cast: Arc<dyn Cast>) {
        self.resolved.write().insert(identifier.into(), cast);
    }

    /// Register the cast for an enum under its name.
    pub fn register_enum<E: BackedEnum>(&self) {
        self.register(E::NAME, Arc::new(BackedEnumCast::of::<E>()));
    }

    /// Resolve an identifier to a caster.
    pub fn resolve(&self, identifier: &str) -> OdmResult<Arc<dyn Cast>> {
        if let Some(cast) = self.resolved.read().get(identifier) {
            return Ok(Arc::clone(cast));
        }

        let cast: Arc<dyn Cast> = match identifier {
            "datetime" | "immutable_datetime" => Arc::new(DateTimeCast),
            "uuid" => Arc::new(UuidCast),
            other => {
                return Err(OdmError::config(format!("unresolvable cast identifier '{other}'")));
            }
        };

        debug!(cast = %identifier, "Resolved cast");
        let mut resolved = self.resolved.write();
        let entry = resolved
            .entry(SmolStr::new(identifier))
            .or_insert_with(|| cast);
        Ok(Arc::clone(entry))
    }

    /// Number of memoized casters.
    pub fn len(&self) -> usize {
        self.resolved.read().len()
    }

    /// Whether nothing has been resolved or registered yet.
    pub fn is_empty(&self) -> bool {
        self.resolved.read().is_empty()
    }
}
