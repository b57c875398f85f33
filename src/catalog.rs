//! Entity catalog - policies, storage models and mutation name tables.
//!
//! A catalog file looks like:
//!
//! ```json
//! {
//!   "scalar_kinds": { "PointField": "json" },
//!   "entities": {
//!     "widget": {
//!       "model": {
//!         "fields": [
//!           { "name": "id", "kind": "AutoField", "primary_key": true },
//!           { "name": "name", "kind": "CharField", "unique": true }
//!         ]
//!       },
//!       "policy": { "id": { "create": "deny" }, "name": { "create": "require" } },
//!       "mutation": {
//!         "entity_label": "Widget",
//!         "operation_names": { "create": "createWidget", "update": "updateWidget" }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;

use crate::error::GenerateError;
use crate::merge::{merge_scoped, ResolvedSpecs};
use crate::policy::EntityPolicy;
use crate::reflect::{reflect, ModelDescription, ModelSource};
use crate::types::{EntityId, MutationIntent, ScalarKind};

/// Identifier field assumed when reflection marks no primary key.
pub const DEFAULT_IDENTIFIER: &str = "id";

/// Storage kinds recognised without configuration.
const BUILTIN_STORAGE_KINDS: &[(&str, ScalarKind)] = &[
    ("AutoField", ScalarKind::Integer),
    ("BigAutoField", ScalarKind::Integer),
    ("IntegerField", ScalarKind::Integer),
    ("BigIntegerField", ScalarKind::Integer),
    ("BinaryField", ScalarKind::Integer),
    ("CharField", ScalarKind::Text),
    ("EmailField", ScalarKind::Text),
    ("TextField", ScalarKind::Text),
    ("BooleanField", ScalarKind::Boolean),
    ("NullBooleanField", ScalarKind::Boolean),
    ("DateField", ScalarKind::Date),
    ("DateTimeField", ScalarKind::Datetime),
    ("TimeField", ScalarKind::Time),
    ("DecimalField", ScalarKind::Decimal),
    ("FloatField", ScalarKind::Float),
    ("UUIDField", ScalarKind::Identifier),
    ("JSONField", ScalarKind::Json),
];

/// Mapping from storage kinds to scalar kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarMapping {
    kinds: BTreeMap<String, ScalarKind>,
}

impl Default for ScalarMapping {
    fn default() -> Self {
        let mut kinds: BTreeMap<String, ScalarKind> = BUILTIN_STORAGE_KINDS
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();
        for kind in [
            ScalarKind::Integer,
            ScalarKind::Text,
            ScalarKind::Boolean,
            ScalarKind::Date,
            ScalarKind::Datetime,
            ScalarKind::Time,
            ScalarKind::Decimal,
            ScalarKind::Float,
            ScalarKind::Json,
            ScalarKind::Identifier,
        ] {
            kinds.insert(kind.as_str().to_string(), kind);
        }
        Self { kinds }
    }
}

impl ScalarMapping {
    /// Add or override the mapping of one storage kind.
    pub fn with(mut self, storage_kind: impl Into<String>, kind: ScalarKind) -> Self {
        self.kinds.insert(storage_kind.into(), kind);
        self
    }

    pub fn lookup(&self, storage_kind: &str) -> Option<ScalarKind> {
        self.kinds.get(storage_kind).copied()
    }
}

/// Operation names of an entity's create and update mutations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationNames {
    pub create: String,
    pub update: String,
}

/// Mutation name table supplied by the entity owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MutationConfig {
    pub entity_label: String,
    pub operation_names: OperationNames,
}

impl MutationConfig {
    pub fn new(
        entity_label: impl Into<String>,
        create: impl Into<String>,
        update: impl Into<String>,
    ) -> Self {
        Self {
            entity_label: entity_label.into(),
            operation_names: OperationNames {
                create: create.into(),
                update: update.into(),
            },
        }
    }

    /// Mutation operation name for an intent.
    pub fn operation_name(&self, intent: MutationIntent) -> &str {
        match intent {
            MutationIntent::Create => &self.operation_names.create,
            MutationIntent::Update => &self.operation_names.update,
        }
    }
}

/// Everything the catalog knows about one entity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDefinition {
    pub policy: EntityPolicy,
    #[serde(default)]
    pub model: Option<ModelDescription>,
    #[serde(default)]
    pub mutation: Option<MutationConfig>,
}

impl EntityDefinition {
    pub fn new(policy: EntityPolicy) -> Self {
        Self {
            policy,
            model: None,
            mutation: None,
        }
    }

    pub fn with_model(mut self, model: ModelDescription) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_mutation(mut self, mutation: MutationConfig) -> Self {
        self.mutation = Some(mutation);
        self
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogRepr {
    #[serde(default)]
    scalar_kinds: BTreeMap<String, ScalarKind>,
    #[serde(default)]
    entities: BTreeMap<EntityId, EntityDefinition>,
}

impl From<CatalogRepr> for Catalog {
    fn from(repr: CatalogRepr) -> Self {
        let scalar_mapping = repr
            .scalar_kinds
            .into_iter()
            .fold(ScalarMapping::default(), |mapping, (storage, kind)| {
                mapping.with(storage, kind)
            });
        Catalog {
            entities: repr.entities,
            scalar_mapping,
            resolved: RwLock::default(),
        }
    }
}

/// Entities known to the generator.
///
/// Resolved specs are computed on first use and cached for the lifetime of
/// the catalog; definitions are immutable once inserted.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "CatalogRepr")]
pub struct Catalog {
    entities: BTreeMap<EntityId, EntityDefinition>,
    scalar_mapping: ScalarMapping,
    resolved: RwLock<HashMap<EntityId, Arc<ResolvedSpecs>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, id: impl Into<EntityId>, definition: EntityDefinition) -> Self {
        self.entities.insert(id.into(), definition);
        self
    }

    pub fn with_scalar_mapping(mut self, mapping: ScalarMapping) -> Self {
        self.scalar_mapping = mapping;
        self
    }

    pub fn scalar_mapping(&self) -> &ScalarMapping {
        &self.scalar_mapping
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Look up an entity definition.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnknownEntity` if the catalog has no such entity.
    pub fn entity(&self, id: &EntityId) -> Result<&EntityDefinition, GenerateError> {
        self.entities
            .get(id)
            .ok_or_else(|| GenerateError::UnknownEntity {
                entity: id.to_string(),
            })
    }

    /// Mutation name table of an entity.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnknownEntity` or
    /// `GenerateError::MissingMutationConfig`.
    pub fn mutation_config(&self, id: &EntityId) -> Result<&MutationConfig, GenerateError> {
        self.entity(id)?
            .mutation
            .as_ref()
            .ok_or_else(|| GenerateError::MissingMutationConfig {
                entity: id.to_string(),
            })
    }

    /// Resolved specs of an entity's own policy, cached after the first call.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError` if the entity is unknown or its policy names
    /// fields its model does not have.
    pub fn resolve(&self, id: &EntityId) -> Result<Arc<ResolvedSpecs>, GenerateError> {
        if let Some(specs) = read_lock(&self.resolved).get(id) {
            return Ok(Arc::clone(specs));
        }

        let definition = self.entity(id)?;
        let specs = Arc::new(self.resolve_policy(
            id,
            &definition.policy,
            definition.model.as_ref().map(|m| m as &dyn ModelSource),
        )?);
        tracing::debug!(entity = %id, fields = specs.len(), "resolved entity policy");

        let mut cache = write_lock(&self.resolved);
        Ok(Arc::clone(cache.entry(id.clone()).or_insert(specs)))
    }

    /// Reflect and merge an arbitrary policy against an optional model.
    ///
    /// Inline relation policies are resolved against the related entity's
    /// catalog model, when the catalog has one.
    pub fn resolve_policy(
        &self,
        entity: &EntityId,
        policy: &EntityPolicy,
        model: Option<&dyn ModelSource>,
    ) -> Result<ResolvedSpecs, GenerateError> {
        self.resolve_scoped(entity, entity, policy, model)
    }

    fn resolve_scoped(
        &self,
        entity: &EntityId,
        scope: &EntityId,
        policy: &EntityPolicy,
        model: Option<&dyn ModelSource>,
    ) -> Result<ResolvedSpecs, GenerateError> {
        let reflected = match model {
            Some(model) => reflect(entity.as_str(), model, policy)?,
            None => BTreeMap::new(),
        };

        merge_scoped(entity, scope, policy, &reflected, |identity, relation, fields| {
            let related_model = self
                .entities
                .get(&relation.related_type)
                .and_then(|definition| definition.model.as_ref())
                .map(|m| m as &dyn ModelSource);
            self.resolve_scoped(&relation.related_type, identity, fields, related_model)
                .map(Arc::new)
        })
    }

    /// Name of the field whose presence marks a values bag as an update.
    pub fn identifier_field(&self, id: &EntityId) -> Result<String, GenerateError> {
        let specs = self.resolve(id)?;
        Ok(specs
            .primary_key()
            .unwrap_or(DEFAULT_IDENTIFIER)
            .to_string())
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
