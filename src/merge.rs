//! Policy/metadata merge - one resolved spec per policy field.
//!
//! Precedence per field:
//!
//! | Property | Source |
//! |----------|--------|
//! | scalar kind | policy `type` if given, else reflected storage kind |
//! | relation | policy only; no scalar kind is resolved |
//! | uniqueness tags | reflection only |
//! | permissions | policy only |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::GenerateError;
use crate::policy::{EntityPolicy, FieldPolicy, OperationRule, RelationPolicy};
use crate::reflect::{ReflectedField, UniquenessTag};
use crate::types::{Access, CrudOperation, EntityId, ScalarKind};

/// Where a scalar field's kind came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarSource {
    /// Declared by the policy; always has an output mapping.
    Declared(ScalarKind),
    /// Storage kind from reflection; mapped at generation time.
    Reflected(String),
}

/// Reference used to recurse into a related entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRef {
    /// Identity of the nested generated type.
    pub identity: EntityId,
    pub related_type: EntityId,
    /// Resolved inline policy; `None` defers to the related entity's catalog specs.
    pub nested: Option<Arc<ResolvedSpecs>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarSource),
    Relation(RelationRef),
}

/// Merge of policy and reflection for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub uniqueness: BTreeSet<UniquenessTag>,
    pub permissions: BTreeMap<CrudOperation, OperationRule>,
}

impl ResolvedFieldSpec {
    /// Access for an operation; unset means allowed.
    pub fn access(&self, operation: CrudOperation) -> Access {
        self.permissions
            .get(&operation)
            .map(OperationRule::access)
            .unwrap_or_default()
    }

    /// Eligible as an upsert match key, regardless of permissions.
    pub fn is_match_key(&self) -> bool {
        !self.uniqueness.is_empty()
    }

    pub fn relation(&self) -> Option<&RelationRef> {
        match &self.kind {
            FieldKind::Relation(relation) => Some(relation),
            FieldKind::Scalar(_) => None,
        }
    }
}

/// Resolved specs of one entity, in policy declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSpecs {
    entity: EntityId,
    fields: Vec<ResolvedFieldSpec>,
}

impl ResolvedSpecs {
    pub fn new(entity: impl Into<EntityId>, fields: Vec<ResolvedFieldSpec>) -> Self {
        Self {
            entity: entity.into(),
            fields,
        }
    }

    /// Entity whose model backs these specs.
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedFieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFieldSpec> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Name of the primary-key field, if reflection marked one.
    pub fn primary_key(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.uniqueness.contains(&UniquenessTag::Primary))
            .map(|f| f.name.as_str())
    }
}

/// Merge a policy with its reflected metadata.
///
/// `nested` resolves inline relation policies; it is not called for
/// relations that defer to the related entity's own policy. It receives the
/// identity assigned to the nested type, which scopes any relations the
/// nested policy declares in turn.
///
/// # Errors
///
/// Returns `GenerateError::UnknownField` for a scalar field with neither an
/// explicit type nor reflected metadata, and propagates errors from `nested`.
pub fn merge<F>(
    entity: &EntityId,
    policy: &EntityPolicy,
    reflected: &BTreeMap<String, ReflectedField>,
    nested: F,
) -> Result<ResolvedSpecs, GenerateError>
where
    F: FnMut(
        &EntityId,
        &RelationPolicy,
        &EntityPolicy,
    ) -> Result<Arc<ResolvedSpecs>, GenerateError>,
{
    merge_scoped(entity, entity, policy, reflected, nested)
}

/// Like [`merge`], with inline relation identities derived from `scope`
/// instead of the entity.
pub fn merge_scoped<F>(
    entity: &EntityId,
    scope: &EntityId,
    policy: &EntityPolicy,
    reflected: &BTreeMap<String, ReflectedField>,
    mut nested: F,
) -> Result<ResolvedSpecs, GenerateError>
where
    F: FnMut(
        &EntityId,
        &RelationPolicy,
        &EntityPolicy,
    ) -> Result<Arc<ResolvedSpecs>, GenerateError>,
{
    let fields = policy
        .iter()
        .map(|(name, field_policy)| {
            merge_field(entity, scope, name, field_policy, reflected.get(name), &mut nested)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedSpecs::new(entity.clone(), fields))
}

fn merge_field<F>(
    entity: &EntityId,
    scope: &EntityId,
    name: &str,
    policy: &FieldPolicy,
    reflected: Option<&ReflectedField>,
    nested: &mut F,
) -> Result<ResolvedFieldSpec, GenerateError>
where
    F: FnMut(
        &EntityId,
        &RelationPolicy,
        &EntityPolicy,
    ) -> Result<Arc<ResolvedSpecs>, GenerateError>,
{
    let kind = match (policy.relation(), policy.explicit_scalar(), reflected) {
        (Some(relation), _, _) => {
            let identity = relation.identity(scope, name);
            let nested = match &relation.fields {
                Some(fields) => Some(nested(&identity, relation, fields)?),
                None => None,
            };
            FieldKind::Relation(RelationRef {
                identity,
                related_type: relation.related_type.clone(),
                nested,
            })
        }
        (None, Some(kind), _) => FieldKind::Scalar(ScalarSource::Declared(kind)),
        (None, None, Some(field)) => {
            FieldKind::Scalar(ScalarSource::Reflected(field.storage_kind.clone()))
        }
        (None, None, None) => {
            return Err(GenerateError::UnknownField {
                entity: entity.to_string(),
                field: name.to_string(),
            })
        }
    };

    Ok(ResolvedFieldSpec {
        name: name.to_string(),
        kind,
        uniqueness: reflected
            .map(ReflectedField::uniqueness_tags)
            .unwrap_or_default(),
        permissions: policy.rules().clone(),
    })
}
