//! Conversion between internal and wire field names.
//!
//! Internal names are lowercase and underscore-separated (`first_name`);
//! names in rendered documents are camel case (`firstName`). Results read
//! back from a transport must go through [`to_internal`].
//!
//! Wire names split into words only before an uppercase letter, so digits
//! stay attached to the word they follow: `address_line1` <-> `addressLine1`.
//! An internal segment that starts with a digit (`line_1`) has no distinct
//! wire form and does not survive the round trip.

use std::collections::HashSet;

use convert_case::{Boundary, Case, Casing};
use serde_json::{Map, Value};

/// Word boundary in front of every uppercase letter.
const BEFORE_UPPER: Boundary = Boundary::Custom {
    condition: next_is_upper,
    start: 1,
    len: 0,
};

fn next_is_upper(graphemes: &[&str]) -> bool {
    graphemes
        .get(1)
        .is_some_and(|g| g.chars().all(|c| c.is_ascii_uppercase()))
}

/// Convert an internal name to its wire form.
pub fn to_wire(name: &str) -> String {
    name.from_case(Case::Snake).to_case(Case::Camel)
}

/// Convert a wire name back to its internal form.
pub fn to_internal(name: &str) -> String {
    name.set_boundaries(&[BEFORE_UPPER]).to_case(Case::Snake)
}

/// Accept either form and return the internal name.
pub fn normalize(name: &str) -> String {
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        to_internal(name)
    } else {
        name.to_string()
    }
}

/// First object key, at any depth, that names the same field as an earlier
/// key of its object once both are normalized (`first_name` and `firstName`).
pub fn colliding_key(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let mut seen = HashSet::new();
            for (key, inner) in map {
                if !seen.insert(normalize(key)) {
                    return Some(key.clone());
                }
                if let Some(found) = colliding_key(inner) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(arr) => arr.iter().find_map(colliding_key),
        _ => None,
    }
}

/// Camel-case label used to name a mutation document, e.g. `DataPoint` -> `dataPoint`.
pub fn label(entity_label: &str) -> String {
    entity_label.to_case(Case::Camel)
}

/// Pascal-case form of an internal name, used for generated type names.
pub fn pascal(name: &str) -> String {
    name.from_case(Case::Snake).to_case(Case::Pascal)
}

/// Recursively convert object keys of a value to wire names.
pub fn wire_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_wire(&normalize(k)), wire_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(wire_keys).collect()),
        other => other.clone(),
    }
}

/// Recursively convert object keys of a raw result back to internal names.
pub fn internal_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_internal(k), internal_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(arr) => Value::Array(arr.iter().map(internal_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn internal_to_wire() {
        assert_eq!(to_wire("first_name"), "firstName");
        assert_eq!(to_wire("id"), "id");
        assert_eq!(to_wire("date_joined_at"), "dateJoinedAt");
    }

    #[test]
    fn wire_to_internal_inverts() {
        for name in ["id", "first_name", "date_joined_at", "is_staff"] {
            assert_eq!(to_internal(&to_wire(name)), name);
        }
    }

    #[test]
    fn digits_stay_with_their_word() {
        assert_eq!(to_wire("address_line1"), "addressLine1");
        assert_eq!(to_internal("addressLine1"), "address_line1");
        assert_eq!(to_internal("point2d"), "point2d");
        assert_eq!(normalize("utf8Name"), "utf8_name");
    }

    #[test]
    fn round_trip_with_digits_and_short_segments() {
        for name in ["address_line1", "point2d", "x1_y2", "a_b_c", "ipv4_address", "sha256"] {
            assert_eq!(to_internal(&to_wire(name)), name, "{}", name);
        }
    }

    #[test]
    fn normalize_accepts_both_forms() {
        assert_eq!(normalize("firstName"), "first_name");
        assert_eq!(normalize("first_name"), "first_name");
    }

    #[test]
    fn pascal_for_type_names() {
        assert_eq!(pascal("user_related"), "UserRelated");
        assert_eq!(pascal("widget"), "Widget");
    }

    #[test]
    fn label_camel_cases() {
        assert_eq!(label("Widget"), "widget");
        assert_eq!(label("DataPoint"), "dataPoint");
    }

    #[test]
    fn finds_keys_naming_one_field() {
        assert_eq!(
            colliding_key(&json!({ "first_name": 1, "firstName": 2 })),
            Some("firstName".into())
        );
        assert_eq!(
            colliding_key(&json!({ "owner": [{ "user_id": 1, "userId": 2 }] })),
            Some("userId".into())
        );
        assert_eq!(colliding_key(&json!({ "first_name": 1, "last_name": 2 })), None);
    }

    #[test]
    fn converts_nested_keys() {
        let value = json!({ "first_name": "a", "data_point": { "point_id": 1 }, "tags": [{ "tag_name": "x" }] });
        let wire = wire_keys(&value);
        assert_eq!(
            wire,
            json!({ "firstName": "a", "dataPoint": { "pointId": 1 }, "tags": [{ "tagName": "x" }] })
        );
        assert_eq!(internal_keys(&wire), value);
    }
}
