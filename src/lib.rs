//! CRUD Policy Types
//!
//! Generates per-operation input types and query/mutation documents from
//! declarative field policies merged with storage model metadata.
//!
//! A field policy says, per CRUD operation, whether a field is denied,
//! required or allowed. The generator merges each policy with reflected
//! model metadata (storage kind, uniqueness) and produces one input type per
//! entity and operation, reusing types through a process-wide registry.
//!
//! # Example
//!
//! ```
//! use crud_policy::{
//!     Catalog, CrudOperation, EntityDefinition, EntityId, EntityPolicy, FieldPolicy,
//!     Permission, ScalarKind, TypeGenerator, TypeRegistry,
//! };
//!
//! let policy = EntityPolicy::new()
//!     .with_field(
//!         "id",
//!         FieldPolicy::new()
//!             .scalar(ScalarKind::Integer)
//!             .with(CrudOperation::Create, Permission::Deny),
//!     )
//!     .with_field(
//!         "first_name",
//!         FieldPolicy::new()
//!             .scalar(ScalarKind::Text)
//!             .with(CrudOperation::Create, Permission::Require),
//!     );
//! let catalog = Catalog::new().with_entity("user", EntityDefinition::new(policy));
//!
//! let registry = TypeRegistry::new();
//! let generator = TypeGenerator::with_registry(&catalog, &registry);
//! let create = generator
//!     .generate_entity(&EntityId::new("user"), CrudOperation::Create)
//!     .unwrap();
//!
//! // "id" is denied for create; "first_name" is required and renamed
//! assert_eq!(
//!     create.to_string(),
//!     "input UserCreateInputType {\n  firstName: String!\n}"
//! );
//! ```
//!
//! # Permission Rules
//!
//! | Permission | Effect on generated type |
//! |------------|--------------------------|
//! | `"deny"` | Field excluded |
//! | `"require"` | Field present, required |
//! | `"allow"` | Field present, optional |
//! | `"unique"` / `"primary"` | Existence-match hint only |
//! | (none) | Field present, optional |
//!
//! # Policy Format
//!
//! Rules can be shorthand (applies to all operations):
//! ```json
//! { "id": "allow" }
//! ```
//!
//! Or per-operation, optionally with an explicit type or a relation:
//! ```json
//! {
//!   "id": { "create": "deny", "update": ["require", "primary"] },
//!   "owner": { "related": { "type": "user", "fields": { "id": "require" } } }
//! }
//! ```

mod catalog;
mod document;
mod error;
mod generator;
mod linter;
mod loader;
mod merge;
mod naming;
mod policy;
mod reflect;
mod types;
mod upsert;
mod validator;

pub use catalog::{
    Catalog, EntityDefinition, MutationConfig, OperationNames, ScalarMapping, DEFAULT_IDENTIFIER,
};
pub use document::{
    Argument, ArgumentValue, Document, DocumentBuilder, OperationKind, RootField, Selection,
    VariableDef,
};
pub use error::{GenerateError, LoadError, SchemaError, ValidateError};
pub use generator::{
    FieldType, GeneratedField, GeneratedType, TypeGenerator, TypeHandle, TypeKey, TypeRegistry,
};
pub use linter::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    is_url, load_catalog, load_json, load_json_auto, load_json_str, load_values, parse_catalog,
};
pub use merge::{
    merge, merge_scoped, FieldKind, RelationRef, ResolvedFieldSpec, ResolvedSpecs,
    ScalarSource,
};
pub use naming::{
    colliding_key, internal_keys, label, normalize, to_internal, to_wire, wire_keys,
};
pub use policy::{EntityPolicy, FieldPolicy, OperationRule, RelationPolicy};
pub use reflect::{
    group_id, reflect, ModelDescription, ModelField, ModelSource, ReflectedField, UniquenessTag,
};
pub use types::{
    Access, CrudOperation, EntityId, MutationIntent, Permission, ScalarKind, VALID_OPERATIONS,
};
pub use upsert::{partition, resolve_intent, resolve_intent_with, UpsertParameters};
pub use validator::{json_schema, validate_entity_values, validate_values};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
