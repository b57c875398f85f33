//! Core vocabulary for field policies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Valid CRUD operation names for policy object form.
pub const VALID_OPERATIONS: &[&str] = &["create", "read", "update", "delete"];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The axis along which field visibility and requiredness vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOperation {
    pub const ALL: [CrudOperation; 4] = [
        CrudOperation::Create,
        CrudOperation::Read,
        CrudOperation::Update,
        CrudOperation::Delete,
    ];

    /// Lowercase name as used in policy files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOperation::Create => "create",
            CrudOperation::Read => "read",
            CrudOperation::Update => "update",
            CrudOperation::Delete => "delete",
        }
    }

    /// Capitalized name as used in generated type names.
    pub fn type_suffix(&self) -> &'static str {
        match self {
            CrudOperation::Create => "Create",
            CrudOperation::Read => "Read",
            CrudOperation::Update => "Update",
            CrudOperation::Delete => "Delete",
        }
    }

    /// Parse an operation name, case-insensitively.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(CrudOperation::Create),
            "read" => Some(CrudOperation::Read),
            "update" => Some(CrudOperation::Update),
            "delete" => Some(CrudOperation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for CrudOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag on a (field, operation) pair.
///
/// `Unique` and `Primary` may appear next to `Require` or `Allow` in the
/// same rule. They document that the field takes part in existence
/// matching; the authoritative uniqueness facts come from the storage model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Deny,
    Require,
    Allow,
    Unique,
    Primary,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Deny => "deny",
            Permission::Require => "require",
            Permission::Allow => "allow",
            Permission::Unique => "unique",
            Permission::Primary => "primary",
        }
    }

    /// Parse a permission value from a string.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deny" => Some(Permission::Deny),
            "require" => Some(Permission::Require),
            "allow" => Some(Permission::Allow),
            "unique" => Some(Permission::Unique),
            "primary" => Some(Permission::Primary),
            _ => None,
        }
    }
}

/// Effective access of a field for one operation.
///
/// Derived from the permissions of a rule: `Deny` beats `Require`,
/// which beats `Allow`. A field with no rule for the operation is `Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// Remove field from the generated type.
    Deny,
    /// Keep field and mark it required.
    Require,
    /// Keep field as optional.
    #[default]
    Allow,
}

/// Canonical scalar kinds a field can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Integer,
    Text,
    Boolean,
    Date,
    Datetime,
    Time,
    Decimal,
    Float,
    Json,
    Identifier,
}

impl ScalarKind {
    /// Name of the scalar in rendered schema text.
    pub fn output_name(&self) -> &'static str {
        match self {
            ScalarKind::Integer => "Int",
            ScalarKind::Text => "String",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Date => "Date",
            ScalarKind::Datetime => "DateTime",
            ScalarKind::Time => "Time",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Float => "Float",
            ScalarKind::Json => "JSONString",
            ScalarKind::Identifier => "UUID",
        }
    }

    /// Lowercase name as used in policy and catalog files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Integer => "integer",
            ScalarKind::Text => "text",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Date => "date",
            ScalarKind::Datetime => "datetime",
            ScalarKind::Time => "time",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Float => "float",
            ScalarKind::Json => "json",
            ScalarKind::Identifier => "identifier",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "integer" => Some(ScalarKind::Integer),
            "text" => Some(ScalarKind::Text),
            "boolean" => Some(ScalarKind::Boolean),
            "date" => Some(ScalarKind::Date),
            "datetime" => Some(ScalarKind::Datetime),
            "time" => Some(ScalarKind::Time),
            "decimal" => Some(ScalarKind::Decimal),
            "float" => Some(ScalarKind::Float),
            "json" => Some(ScalarKind::Json),
            "identifier" => Some(ScalarKind::Identifier),
            _ => None,
        }
    }
}

/// Whether a values bag is meant to create a new record or update one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationIntent {
    Create,
    Update,
}

impl MutationIntent {
    /// The CRUD operation whose generated type matches this intent.
    pub fn operation(&self) -> CrudOperation {
        match self {
            MutationIntent::Create => CrudOperation::Create,
            MutationIntent::Update => CrudOperation::Update,
        }
    }
}

/// Stable, explicitly assigned identity of an entity or nested policy.
///
/// Generated types are keyed by this identity plus an operation, never by
/// the address of a policy value.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity given to the inline nested policy behind `field` of this type.
    pub fn related(&self, field: &str) -> Self {
        Self(format!("{}_{}_related", self.0, field))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
