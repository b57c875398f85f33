//! Declarative per-field access policies.
//!
//! A policy names the fields an entity exposes and, per CRUD operation,
//! whether each field is denied, required, or allowed. Storage fields the
//! policy does not name are invisible.
//!
//! Policies are usually loaded from JSON:
//!
//! ```json
//! {
//!   "id":    { "create": "deny", "update": ["require", "primary"] },
//!   "name":  { "create": "require", "update": ["allow", "unique"] },
//!   "note":  "allow",
//!   "group": { "related": { "type": "group", "fields": { "id": { "create": "require" } } } }
//! }
//! ```
//!
//! A bare rule (`"note": "allow"`) applies to every operation.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::{Access, CrudOperation, EntityId, Permission, ScalarKind};

/// Permissions a field carries for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RuleRepr")]
pub struct OperationRule {
    permissions: BTreeSet<Permission>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    One(Permission),
    Many(Vec<Permission>),
}

impl From<RuleRepr> for OperationRule {
    fn from(repr: RuleRepr) -> Self {
        match repr {
            RuleRepr::One(permission) => OperationRule::new([permission]),
            RuleRepr::Many(permissions) => OperationRule::new(permissions),
        }
    }
}

impl OperationRule {
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn permissions(&self) -> impl Iterator<Item = Permission> + '_ {
        self.permissions.iter().copied()
    }

    /// Effective access: deny beats require, require beats allow.
    pub fn access(&self) -> Access {
        if self.contains(Permission::Deny) {
            Access::Deny
        } else if self.contains(Permission::Require) {
            Access::Require
        } else {
            Access::Allow
        }
    }

    /// True if the rule marks the field as an existence-matching key.
    pub fn marks_unique(&self) -> bool {
        self.contains(Permission::Unique) || self.contains(Permission::Primary)
    }
}

impl From<Permission> for OperationRule {
    fn from(permission: Permission) -> Self {
        OperationRule::new([permission])
    }
}

/// Policy of a single field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "FieldPolicyRepr")]
pub struct FieldPolicy {
    rules: BTreeMap<CrudOperation, OperationRule>,
    scalar: Option<ScalarKind>,
    related: Option<RelationPolicy>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldPolicyRepr {
    Shorthand(OperationRule),
    Full(FieldPolicyFields),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldPolicyFields {
    #[serde(default)]
    create: Option<OperationRule>,
    #[serde(default)]
    read: Option<OperationRule>,
    #[serde(default)]
    update: Option<OperationRule>,
    #[serde(default)]
    delete: Option<OperationRule>,
    #[serde(default, rename = "type")]
    scalar: Option<ScalarKind>,
    #[serde(default)]
    related: Option<RelationPolicy>,
}

impl From<FieldPolicyRepr> for FieldPolicy {
    fn from(repr: FieldPolicyRepr) -> Self {
        match repr {
            FieldPolicyRepr::Shorthand(rule) => FieldPolicy {
                rules: CrudOperation::ALL
                    .iter()
                    .map(|op| (*op, rule.clone()))
                    .collect(),
                scalar: None,
                related: None,
            },
            FieldPolicyRepr::Full(fields) => {
                let rules = [
                    (CrudOperation::Create, fields.create),
                    (CrudOperation::Read, fields.read),
                    (CrudOperation::Update, fields.update),
                    (CrudOperation::Delete, fields.delete),
                ]
                .into_iter()
                .filter_map(|(op, rule)| rule.map(|r| (op, r)))
                .collect();

                FieldPolicy {
                    rules,
                    scalar: fields.scalar,
                    related: fields.related,
                }
            }
        }
    }
}

impl FieldPolicy {
    /// A field with no rules: allowed and optional everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for one operation.
    pub fn with(mut self, operation: CrudOperation, rule: impl Into<OperationRule>) -> Self {
        self.rules.insert(operation, rule.into());
        self
    }

    /// Declare an explicit scalar kind (virtual field not backed by storage).
    pub fn scalar(mut self, kind: ScalarKind) -> Self {
        self.scalar = Some(kind);
        self
    }

    /// Declare the field as an association to another entity.
    pub fn related(mut self, relation: RelationPolicy) -> Self {
        self.related = Some(relation);
        self
    }

    pub fn rule(&self, operation: CrudOperation) -> Option<&OperationRule> {
        self.rules.get(&operation)
    }

    pub fn rules(&self) -> &BTreeMap<CrudOperation, OperationRule> {
        &self.rules
    }

    /// Access for an operation; unset means allowed.
    pub fn access(&self, operation: CrudOperation) -> Access {
        self.rule(operation)
            .map(OperationRule::access)
            .unwrap_or_default()
    }

    pub fn explicit_scalar(&self) -> Option<ScalarKind> {
        self.scalar
    }

    pub fn relation(&self) -> Option<&RelationPolicy> {
        self.related.as_ref()
    }

    /// True if the field carries its own type instead of deferring to storage.
    pub fn is_self_typed(&self) -> bool {
        self.scalar.is_some() || self.related.is_some()
    }
}

/// Association from a field to another entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationPolicy {
    /// Entity whose storage model backs the nested fields.
    #[serde(rename = "type")]
    pub related_type: EntityId,
    /// Identity of the nested generated type, when it should differ from the default.
    #[serde(default)]
    pub identity: Option<EntityId>,
    /// Nested policy. `None` refers to the related entity's own catalog policy.
    #[serde(default)]
    pub fields: Option<EntityPolicy>,
}

impl RelationPolicy {
    /// Relation exposing the related entity through its own full policy.
    pub fn full(related_type: impl Into<EntityId>) -> Self {
        Self {
            related_type: related_type.into(),
            identity: None,
            fields: None,
        }
    }

    /// Relation exposing only the fields of an inline nested policy.
    pub fn inline(related_type: impl Into<EntityId>, fields: EntityPolicy) -> Self {
        Self {
            related_type: related_type.into(),
            identity: None,
            fields: Some(fields),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<EntityId>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Identity the nested generated type is keyed by, for the relation
    /// declared as `field` of the type identified by `owner`.
    ///
    /// Full references share the related entity's identity. Inline policies
    /// default to `<owner>_<field>_related`, so two owners inlining different
    /// policies for one related entity never share a type.
    pub fn identity(&self, owner: &EntityId, field: &str) -> EntityId {
        match (&self.identity, &self.fields) {
            (Some(identity), _) => identity.clone(),
            (None, Some(_)) => owner.related(field),
            (None, None) => self.related_type.clone(),
        }
    }
}

/// Ordered field policies of one entity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct EntityPolicy {
    fields: Vec<(String, FieldPolicy)>,
}

impl TryFrom<Map<String, Value>> for EntityPolicy {
    type Error = serde_json::Error;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let fields = map
            .into_iter()
            .map(|(name, value)| Ok((name, serde_json::from_value(value)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        Ok(Self { fields })
    }
}

impl EntityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing an earlier policy of the same name in place.
    pub fn with_field(mut self, name: impl Into<String>, policy: FieldPolicy) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = policy,
            None => self.fields.push((name, policy)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldPolicy> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldPolicy)> {
        self.fields.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
