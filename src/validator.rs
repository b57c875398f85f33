//! Values validation against generated types.
//!
//! A generated type is exported as a JSON Schema (wire names, required list,
//! no additional properties, nested types under `$defs`) and values are
//! checked with `jsonschema`.

use serde_json::{json, Map, Value};

use crate::error::{SchemaError, ValidateError};
use crate::generator::{FieldType, TypeGenerator, TypeHandle};
use crate::naming::{colliding_key, wire_keys};
use crate::types::{EntityId, ScalarKind};

const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// JSON Schema of a generated type and every type it reaches.
pub fn json_schema(handle: &TypeHandle) -> Value {
    let mut schema = object_schema(handle);

    let defs: Map<String, Value> = handle
        .reachable()
        .iter()
        .skip(1)
        .map(|nested| (nested.name().to_string(), object_schema(nested)))
        .collect();

    if let Value::Object(map) = &mut schema {
        map.insert("$schema".into(), json!(SCHEMA_DIALECT));
        map.insert("title".into(), json!(handle.name()));
        if !defs.is_empty() {
            map.insert("$defs".into(), Value::Object(defs));
        }
    }
    schema
}

fn object_schema(handle: &TypeHandle) -> Value {
    let properties: Map<String, Value> = handle
        .fields()
        .iter()
        .map(|field| (field.wire_name(), field_schema(&field.ty)))
        .collect();
    let required: Vec<String> = handle.required_fields().map(|f| f.wire_name()).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn field_schema(ty: &FieldType) -> Value {
    match ty {
        FieldType::Object(nested) => json!({ "$ref": format!("#/$defs/{}", nested.name()) }),
        FieldType::Scalar(kind) => scalar_schema(*kind),
    }
}

fn scalar_schema(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::Integer => json!({ "type": "integer" }),
        ScalarKind::Text => json!({ "type": "string" }),
        ScalarKind::Boolean => json!({ "type": "boolean" }),
        ScalarKind::Date => json!({ "type": "string", "format": "date" }),
        ScalarKind::Datetime => json!({ "type": "string", "format": "date-time" }),
        ScalarKind::Time => json!({ "type": "string", "format": "time" }),
        ScalarKind::Decimal => json!({ "type": ["string", "number"] }),
        ScalarKind::Float => json!({ "type": "number" }),
        ScalarKind::Json => json!({}),
        ScalarKind::Identifier => json!({ "type": "string", "format": "uuid" }),
    }
}

/// Validate a values bag against a generated type.
///
/// Keys may use internal or wire names.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` with every violation found.
pub fn validate_values(handle: &TypeHandle, values: &Value) -> Result<(), ValidateError> {
    let schema = json_schema(handle);
    let validator = jsonschema::validator_for(&schema).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    if let Some(key) = colliding_key(values) {
        return Err(ValidateError::Invalid {
            errors: vec![SchemaError {
                path: String::new(),
                message: format!("field '{}' is supplied more than once", key),
            }],
        });
    }

    let instance = wire_keys(values);
    let errors: Vec<SchemaError> = validator
        .iter_errors(&instance)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

/// Pick the create or update type for a values bag and validate against it.
///
/// Returns the type that was used.
pub fn validate_entity_values(
    generator: &TypeGenerator<'_>,
    entity: &EntityId,
    values: &Map<String, Value>,
) -> Result<TypeHandle, ValidateError> {
    let handle = generator.generate_for_values(entity, values)?;
    validate_values(&handle, &Value::Object(values.clone()))?;
    Ok(handle)
}
