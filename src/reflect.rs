//! Model reflection - per-field metadata pulled from a storage model description.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;
use crate::policy::EntityPolicy;

/// External storage model description.
pub trait ModelSource {
    /// All storage fields of the model.
    fn fields(&self) -> &[ModelField];

    /// Multi-field uniqueness constraints, each a list of field names.
    fn unique_groups(&self) -> &[Vec<String>];
}

/// One storage field as the model source reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelField {
    pub name: String,
    /// Storage kind, e.g. `CharField` or `integer`.
    pub kind: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

impl ModelField {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            primary_key: false,
            unique: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A model description loaded from a catalog file or built in code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub fields: Vec<ModelField>,
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl ModelDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_unique_group<I, S>(mut self, group: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(group.into_iter().map(Into::into).collect());
        self
    }
}

impl ModelSource for ModelDescription {
    fn fields(&self) -> &[ModelField] {
        &self.fields
    }

    fn unique_groups(&self) -> &[Vec<String>] {
        &self.unique_together
    }
}

/// Tag marking a field as usable for existence matching.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UniquenessTag {
    Primary,
    Unique,
    /// Member of a multi-field uniqueness group; the id is the sorted, comma-joined member list.
    Group(String),
}

impl fmt::Display for UniquenessTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessTag::Primary => f.write_str("primary"),
            UniquenessTag::Unique => f.write_str("unique"),
            UniquenessTag::Group(id) => write!(f, "group({})", id),
        }
    }
}

/// Metadata reflected for one storage field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedField {
    pub name: String,
    pub storage_kind: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub unique_group_tags: Vec<String>,
}

impl ReflectedField {
    /// All uniqueness tags of this field.
    pub fn uniqueness_tags(&self) -> BTreeSet<UniquenessTag> {
        let mut tags = BTreeSet::new();
        if self.is_primary_key {
            tags.insert(UniquenessTag::Primary);
        }
        if self.is_unique {
            tags.insert(UniquenessTag::Unique);
        }
        tags.extend(self.unique_group_tags.iter().cloned().map(UniquenessTag::Group));
        tags
    }
}

/// Synthetic identifier of a uniqueness group.
pub fn group_id(group: &[String]) -> String {
    let mut members: Vec<&str> = group.iter().map(String::as_str).collect();
    members.sort_unstable();
    members.join(",")
}

/// Reflect the fields a policy names out of a model.
///
/// Fields the policy does not mention are ignored. A policy field absent
/// from the model is accepted only if the policy types it itself (an
/// explicit scalar or a relation); such fields are left out of the result.
///
/// # Errors
///
/// Returns `GenerateError::UnknownField` for a model-deferring policy field
/// the model does not have.
pub fn reflect(
    entity: &str,
    model: &dyn ModelSource,
    policy: &EntityPolicy,
) -> Result<BTreeMap<String, ReflectedField>, GenerateError> {
    for (name, field_policy) in policy.iter() {
        let in_model = model.fields().iter().any(|f| f.name == name);
        if !in_model && !field_policy.is_self_typed() {
            return Err(GenerateError::UnknownField {
                entity: entity.to_string(),
                field: name.to_string(),
            });
        }
    }

    let groups: Vec<(String, &Vec<String>)> = model
        .unique_groups()
        .iter()
        .map(|group| (group_id(group), group))
        .collect();

    let reflected = model
        .fields()
        .iter()
        .filter(|field| policy.contains(&field.name))
        .map(|field| {
            let unique_group_tags = groups
                .iter()
                .filter(|(_, members)| members.contains(&field.name))
                .map(|(id, _)| id.clone())
                .collect();
            (
                field.name.clone(),
                ReflectedField {
                    name: field.name.clone(),
                    storage_kind: field.kind.clone(),
                    is_primary_key: field.primary_key,
                    is_unique: field.unique,
                    unique_group_tags,
                },
            )
        })
        .collect();

    Ok(reflected)
}
