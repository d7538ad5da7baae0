//! Payload normalizers for remote stores.

use serde_json::Value;
use waypoint_core::Fields;

/// Parses the named fields back into structured JSON when they hold
/// JSON-encoded text.
///
/// Some remotes only accept scalar columns, so structured fields end up
/// stored as strings. Values that are not strings, or strings that do not
/// hold a JSON object or array, are left alone.
#[must_use]
pub fn decode_json_text_fields(mut payload: Fields, fields: &[&str]) -> Fields {
    for name in fields {
        let Some(Value::String(text)) = payload.get(*name) else {
            continue;
        };
        match serde_json::from_str::<Value>(text) {
            Ok(decoded @ (Value::Object(_) | Value::Array(_))) => {
                payload.insert((*name).to_owned(), decoded);
            }
            _ => {}
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn decodes_encoded_structures() {
        let payload = fields(json!({
            "id": "a1",
            "location": "{\"lat\":38.7,\"lng\":-9.1}",
            "tags": "[\"food\",\"museum\"]",
        }));

        let normalized = decode_json_text_fields(payload, &["location", "tags"]);
        assert_eq!(normalized["location"], json!({ "lat": 38.7, "lng": -9.1 }));
        assert_eq!(normalized["tags"], json!(["food", "museum"]));
    }

    #[test]
    fn leaves_other_values_alone() {
        let payload = fields(json!({
            "title": "{not json",
            "count": "42",
            "location": { "lat": 1.0 },
        }));

        let normalized = decode_json_text_fields(payload.clone(), &["title", "count", "location", "absent"]);
        assert_eq!(normalized, payload);
    }
}
