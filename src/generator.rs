//! CRUD-aware type generation.
//!
//! Turns resolved specs plus an operation into a named input type. Every
//! `(identity, operation)` pair yields exactly one [`TypeHandle`] per
//! registry; repeated requests return the same handle, and handles compare
//! by identity, not structure.
//!
//! | Access | Effect on the generated type |
//! |--------|------------------------------|
//! | `deny` | Field left out |
//! | `require` | Field kept, required |
//! | `allow` / unset | Field kept, optional |

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, LazyLock, RwLock};

use serde_json::{Map, Value};

use crate::catalog::{read_lock, write_lock, Catalog};
use crate::error::GenerateError;
use crate::merge::{FieldKind, ResolvedFieldSpec, ResolvedSpecs, ScalarSource};
use crate::naming::{pascal, to_wire};
use crate::types::{Access, CrudOperation, EntityId, ScalarKind};
use crate::upsert::resolve_intent_with;

/// Registry key of a generated type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub identity: EntityId,
    pub operation: CrudOperation,
}

impl TypeKey {
    pub fn new(identity: impl Into<EntityId>, operation: CrudOperation) -> Self {
        Self {
            identity: identity.into(),
            operation,
        }
    }

    /// Rendered type name, e.g. `WidgetOwnerRelatedCreateInputType`.
    pub fn type_name(&self) -> String {
        format!(
            "{}{}InputType",
            pascal(self.identity.as_str()),
            self.operation.type_suffix()
        )
    }
}

/// Type of a generated field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarKind),
    Object(TypeHandle),
}

impl FieldType {
    pub fn name(&self) -> String {
        match self {
            FieldType::Scalar(kind) => kind.output_name().to_string(),
            FieldType::Object(handle) => handle.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedField {
    /// Internal field name.
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

impl GeneratedField {
    pub fn wire_name(&self) -> String {
        to_wire(&self.name)
    }
}

/// A generated input type. Immutable once registered.
#[derive(Debug)]
pub struct GeneratedType {
    key: TypeKey,
    name: String,
    fields: Vec<GeneratedField>,
}

impl GeneratedType {
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> CrudOperation {
        self.key.operation
    }

    pub fn fields(&self) -> &[GeneratedField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&GeneratedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &GeneratedField> {
        self.fields.iter().filter(|f| f.required)
    }
}

impl fmt::Display for GeneratedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input {} {{", self.name)?;
        for field in &self.fields {
            let bang = if field.required { "!" } else { "" };
            writeln!(f, "  {}: {}{}", field.wire_name(), field.ty.name(), bang)?;
        }
        write!(f, "}}")
    }
}

/// Shared, identity-compared handle to a generated type.
#[derive(Debug, Clone)]
pub struct TypeHandle(Arc<GeneratedType>);

impl TypeHandle {
    /// True if both handles point at the same registered type.
    pub fn ptr_eq(&self, other: &TypeHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This type and every nested type it reaches, root first, each once.
    pub fn reachable(&self) -> Vec<TypeHandle> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        collect_reachable(self, &mut seen, &mut out);
        out
    }

    /// Schema text of this type and all nested types.
    pub fn render_sdl(&self) -> String {
        self.reachable()
            .iter()
            .map(|handle| handle.to_string())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn collect_reachable(
    handle: &TypeHandle,
    seen: &mut HashSet<TypeKey>,
    out: &mut Vec<TypeHandle>,
) {
    if !seen.insert(handle.key().clone()) {
        return;
    }
    out.push(handle.clone());
    for field in handle.fields() {
        if let FieldType::Object(nested) = &field.ty {
            collect_reachable(nested, seen, out);
        }
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TypeHandle {}

impl Deref for TypeHandle {
    type Target = GeneratedType;

    fn deref(&self) -> &GeneratedType {
        &self.0
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

static GLOBAL_REGISTRY: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);

/// Keyed store of generated types. Entries are never evicted.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<TypeKey, TypeHandle>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn get(&self, key: &TypeKey) -> Option<TypeHandle> {
        read_lock(&self.types).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.types).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a freshly built type, or adopt the handle another caller
    /// registered for the same key first.
    fn register(&self, built: GeneratedType) -> TypeHandle {
        let mut types = write_lock(&self.types);
        match types.entry(built.key.clone()) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    type_name = %built.name,
                    "concurrent generation lost registration, adopting existing type"
                );
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                tracing::debug!(
                    type_name = %built.name,
                    fields = built.fields.len(),
                    "registered generated type"
                );
                slot.insert(TypeHandle(Arc::new(built))).clone()
            }
        }
    }
}

/// Generates types for catalog entities into a registry.
#[derive(Debug, Clone, Copy)]
pub struct TypeGenerator<'a> {
    catalog: &'a Catalog,
    registry: &'a TypeRegistry,
}

impl<'a> TypeGenerator<'a> {
    /// Generator backed by the process-wide registry.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_registry(catalog, TypeRegistry::global())
    }

    pub fn with_registry(catalog: &'a Catalog, registry: &'a TypeRegistry) -> Self {
        Self { catalog, registry }
    }

    /// Get or build the type of `specs` for `operation`, keyed by `identity`.
    ///
    /// The registry is consulted before anything is built. Relation fields
    /// recurse with the same operation.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnsupportedScalarKind` for a storage kind with
    /// no mapping, `GenerateError::CyclicRelation` when recursion comes back
    /// to a type still being built, and `GenerateError::UnknownEntity` for a
    /// relation to an entity the catalog does not have.
    pub fn generate(
        &self,
        identity: &EntityId,
        specs: &ResolvedSpecs,
        operation: CrudOperation,
    ) -> Result<TypeHandle, GenerateError> {
        self.generate_inner(identity, specs, operation, &mut Vec::new())
    }

    /// Generate the type of a catalog entity's own policy.
    pub fn generate_entity(
        &self,
        entity: &EntityId,
        operation: CrudOperation,
    ) -> Result<TypeHandle, GenerateError> {
        let specs = self.catalog.resolve(entity)?;
        self.generate(entity, &specs, operation)
    }

    /// Generate the create or update type matching a values bag.
    pub fn generate_for_values(
        &self,
        entity: &EntityId,
        values: &Map<String, Value>,
    ) -> Result<TypeHandle, GenerateError> {
        let identifier = self.catalog.identifier_field(entity)?;
        let intent = resolve_intent_with(values, &identifier);
        self.generate_entity(entity, intent.operation())
    }

    /// Query arguments: every field not denied for reads, all optional.
    ///
    /// Relations become the read type of the related policy.
    pub fn query_arguments(
        &self,
        specs: &ResolvedSpecs,
    ) -> Result<Vec<GeneratedField>, GenerateError> {
        let mut stack = Vec::new();
        specs
            .iter()
            .filter(|spec| spec.access(CrudOperation::Read) != Access::Deny)
            .map(|spec| {
                Ok(GeneratedField {
                    name: spec.name.clone(),
                    ty: self.field_type(specs, spec, CrudOperation::Read, &mut stack)?,
                    required: false,
                })
            })
            .collect()
    }

    fn generate_inner(
        &self,
        identity: &EntityId,
        specs: &ResolvedSpecs,
        operation: CrudOperation,
        stack: &mut Vec<TypeKey>,
    ) -> Result<TypeHandle, GenerateError> {
        let key = TypeKey::new(identity.clone(), operation);
        if let Some(handle) = self.registry.get(&key) {
            tracing::trace!(type_name = %handle.name(), "generated type cache hit");
            return Ok(handle);
        }

        if let Some(start) = stack.iter().position(|k| *k == key) {
            let mut path: Vec<String> = stack[start..]
                .iter()
                .map(|k| k.identity.to_string())
                .collect();
            path.push(identity.to_string());
            return Err(GenerateError::CyclicRelation { operation, path });
        }

        stack.push(key.clone());
        let fields = self.build_fields(specs, operation, stack);
        stack.pop();

        Ok(self.registry.register(GeneratedType {
            name: key.type_name(),
            key,
            fields: fields?,
        }))
    }

    fn build_fields(
        &self,
        specs: &ResolvedSpecs,
        operation: CrudOperation,
        stack: &mut Vec<TypeKey>,
    ) -> Result<Vec<GeneratedField>, GenerateError> {
        let mut fields = Vec::new();
        for spec in specs.iter() {
            let access = spec.access(operation);
            if access == Access::Deny {
                continue;
            }
            fields.push(GeneratedField {
                name: spec.name.clone(),
                ty: self.field_type(specs, spec, operation, stack)?,
                required: access == Access::Require,
            });
        }
        Ok(fields)
    }

    fn field_type(
        &self,
        specs: &ResolvedSpecs,
        spec: &ResolvedFieldSpec,
        operation: CrudOperation,
        stack: &mut Vec<TypeKey>,
    ) -> Result<FieldType, GenerateError> {
        match &spec.kind {
            FieldKind::Scalar(ScalarSource::Declared(kind)) => Ok(FieldType::Scalar(*kind)),
            FieldKind::Scalar(ScalarSource::Reflected(storage)) => self
                .catalog
                .scalar_mapping()
                .lookup(storage)
                .map(FieldType::Scalar)
                .ok_or_else(|| GenerateError::UnsupportedScalarKind {
                    entity: specs.entity().to_string(),
                    field: spec.name.clone(),
                    kind: storage.clone(),
                }),
            FieldKind::Relation(relation) => {
                let nested = match &relation.nested {
                    Some(nested) => Arc::clone(nested),
                    None => self.catalog.resolve(&relation.related_type)?,
                };
                let handle = self.generate_inner(&relation.identity, &nested, operation, stack)?;
                Ok(FieldType::Object(handle))
            }
        }
    }
}
