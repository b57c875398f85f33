//! Create-vs-update intent and upsert parameter partitioning.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::DEFAULT_IDENTIFIER;
use crate::error::GenerateError;
use crate::merge::ResolvedSpecs;
use crate::naming::normalize;
use crate::types::MutationIntent;

/// Guess whether a values bag creates or updates a record.
///
/// A bag carrying the `id` field is an update; anything else is a create.
/// A create may still end up updating a row when its match keys hit an
/// existing record; that decision belongs to the persistence layer.
pub fn resolve_intent(values: &Map<String, Value>) -> MutationIntent {
    resolve_intent_with(values, DEFAULT_IDENTIFIER)
}

/// Like [`resolve_intent`], with an explicit identifier field name.
pub fn resolve_intent_with(values: &Map<String, Value>, identifier: &str) -> MutationIntent {
    if values.keys().any(|key| normalize(key) == identifier) {
        MutationIntent::Update
    } else {
        MutationIntent::Create
    }
}

/// Values split into existence-match keys and defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertParameters {
    pub match_keys: Map<String, Value>,
    pub defaults: Map<String, Value>,
}

impl UpsertParameters {
    /// No match keys: the upsert is a plain insert.
    pub fn is_pure_insert(&self) -> bool {
        self.match_keys.is_empty()
    }
}

/// Split a values bag by the uniqueness tags of its fields.
///
/// Keys may use internal or wire names; both buckets are keyed by internal
/// names. Every key lands in exactly one bucket.
///
/// # Errors
///
/// Returns `GenerateError::UnknownField` for a key with no resolved spec,
/// and `GenerateError::DuplicateField` when two keys name the same field
/// (`first_name` and `firstName`).
pub fn partition(
    specs: &ResolvedSpecs,
    values: &Map<String, Value>,
) -> Result<UpsertParameters, GenerateError> {
    let mut params = UpsertParameters::default();

    for (key, value) in values {
        let name = normalize(key);
        let spec = specs
            .get(&name)
            .ok_or_else(|| GenerateError::UnknownField {
                entity: specs.entity().to_string(),
                field: key.clone(),
            })?;

        if params.match_keys.contains_key(&name) || params.defaults.contains_key(&name) {
            return Err(GenerateError::DuplicateField {
                entity: specs.entity().to_string(),
                field: key.clone(),
            });
        }

        let bucket = if spec.is_match_key() {
            &mut params.match_keys
        } else {
            &mut params.defaults
        };
        bucket.insert(name, value.clone());
    }

    Ok(params)
}
