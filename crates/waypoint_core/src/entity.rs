//! Typed entity kinds.

use crate::error::{CoreError, CoreResult};
use crate::types::{Fields, RecordId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Trait for types that can be cached and synced as records.
///
/// Entities serialize to a JSON object. The `"id"` field is owned by the
/// cache and always equals [`Entity::record_id`].
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use waypoint_core::{Entity, RecordId};
///
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     id: RecordId,
///     trip_id: String,
///     content: String,
/// }
///
/// impl Entity for Note {
///     const TABLE: &'static str = "notes";
///
///     fn record_id(&self) -> RecordId {
///         self.id.clone()
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Table holding this entity kind.
    const TABLE: &'static str;

    /// Returns the entity's stable identifier.
    fn record_id(&self) -> RecordId;

    /// Serializes the entity into record fields.
    fn to_fields(&self) -> CoreResult<Fields> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(CoreError::invalid_payload(
                Self::TABLE,
                format!("entity serialized to {other}, expected an object"),
            )),
            Err(e) => Err(CoreError::invalid_payload(Self::TABLE, e.to_string())),
        }
    }

    /// Rebuilds the entity from record fields.
    fn from_fields(fields: &Fields) -> CoreResult<Self> {
        serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|e| CoreError::invalid_payload(Self::TABLE, e.to_string()))
    }
}
