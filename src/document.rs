//! Query and mutation documents.
//!
//! Builders produce a [`Document`] tree first (operation, variable
//! definitions, argument bindings, selection set); text comes from its
//! `Display` impl. Name conversion to the wire convention happens once, when
//! the tree is built, so every name in a `Document` is already a wire name.
//!
//! Builders never execute anything. Running the text is the caller's job.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::{Catalog, MutationConfig, DEFAULT_IDENTIFIER};
use crate::error::GenerateError;
use crate::merge::ResolvedSpecs;
use crate::naming::{colliding_key, label, normalize, to_wire, wire_keys};
use crate::types::{CrudOperation, EntityId};
use crate::upsert::resolve_intent_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// Typed document parameter, rendered as `$name: Type!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDef {
    pub name: String,
    pub type_name: String,
}

impl VariableDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Parse `name:Type` as given on a command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, type_name) = s.split_once(':')?;
        let (name, type_name) = (name.trim(), type_name.trim());
        if name.is_empty() || type_name.is_empty() {
            return None;
        }
        Some(Self::new(name, type_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// Reference to a declared variable.
    Variable(String),
    /// Inline literal.
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgumentValue,
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Field(String),
    Nested {
        name: String,
        selections: Vec<Selection>,
    },
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Selection::Field(name.into())
    }

    pub fn nested(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::Nested {
            name: name.into(),
            selections,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Selection::Field(name) | Selection::Nested { name, .. } => name,
        }
    }

    fn to_wire(&self) -> Selection {
        match self {
            Selection::Field(name) => Selection::Field(to_wire(&normalize(name))),
            Selection::Nested { name, selections } => Selection::Nested {
                name: to_wire(&normalize(name)),
                selections: selections.iter().map(Selection::to_wire).collect(),
            },
        }
    }
}

/// The single root field of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct RootField {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: OperationKind,
    pub name: String,
    pub variables: Vec<VariableDef>,
    pub root: RootField,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.keyword(), self.name)?;
        if !self.variables.is_empty() {
            let defs: Vec<String> = self
                .variables
                .iter()
                .map(|v| format!("${}: {}!", v.name, v.type_name))
                .collect();
            write!(f, "({})", defs.join(", "))?;
        }
        writeln!(f, " {{")?;

        write!(f, "  {}", self.root.name)?;
        if !self.root.arguments.is_empty() {
            f.write_char('(')?;
            for (i, arg) in self.root.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: ", arg.name)?;
                match &arg.value {
                    ArgumentValue::Variable(name) => write!(f, "${}", name)?,
                    ArgumentValue::Literal(value) => write_literal(f, value)?,
                }
            }
            f.write_char(')')?;
        }
        writeln!(f, " {{")?;
        write_selections(f, &self.root.selections, 2)?;
        writeln!(f, "  }}")?;
        write!(f, "}}")
    }
}

fn write_selections(
    f: &mut fmt::Formatter<'_>,
    selections: &[Selection],
    depth: usize,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for selection in selections {
        match selection {
            Selection::Field(name) => writeln!(f, "{}{}", indent, name)?,
            Selection::Nested { name, selections } => {
                writeln!(f, "{}{} {{", indent, name)?;
                write_selections(f, selections, depth + 1)?;
                writeln!(f, "{}}}", indent)?;
            }
        }
    }
    Ok(())
}

/// Write a value as an argument literal: object keys unquoted, scalars as JSON.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Object(map) => {
            f.write_char('{')?;
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: ", key)?;
                write_literal(f, item)?;
            }
            f.write_char('}')
        }
        Value::Array(items) => {
            f.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_literal(f, item)?;
            }
            f.write_char(']')
        }
        scalar => write!(f, "{}", scalar),
    }
}

/// Builds documents against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct DocumentBuilder<'a> {
    catalog: &'a Catalog,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Selection set of every resolved field, recursing into relations.
    ///
    /// Names are internal; builders convert them.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::CyclicRelation` when relations loop back to a
    /// policy already being selected.
    pub fn selections(&self, specs: &ResolvedSpecs) -> Result<Vec<Selection>, GenerateError> {
        self.selections_inner(specs.entity(), specs, &mut Vec::new())
    }

    fn selections_inner(
        &self,
        identity: &EntityId,
        specs: &ResolvedSpecs,
        stack: &mut Vec<EntityId>,
    ) -> Result<Vec<Selection>, GenerateError> {
        if let Some(start) = stack.iter().position(|id| id == identity) {
            let mut path: Vec<String> =
                stack[start..].iter().map(ToString::to_string).collect();
            path.push(identity.to_string());
            return Err(GenerateError::CyclicRelation {
                operation: CrudOperation::Read,
                path,
            });
        }

        stack.push(identity.clone());
        let mut selections = Vec::with_capacity(specs.len());
        for spec in specs.iter() {
            match spec.relation() {
                None => selections.push(Selection::field(&spec.name)),
                Some(relation) => {
                    let nested = match &relation.nested {
                        Some(nested) => Arc::clone(nested),
                        None => self.catalog.resolve(&relation.related_type)?,
                    };
                    let inner = self.selections_inner(&relation.identity, &nested, stack)?;
                    selections.push(Selection::nested(&spec.name, inner));
                }
            }
        }
        stack.pop();
        Ok(selections)
    }

    /// Build a read query.
    ///
    /// Declares `variables` as parameters and binds each to the root-field
    /// argument of the same name. Selects `overrides` if given, otherwise
    /// every resolved field.
    pub fn build_query(
        &self,
        operation_name: &str,
        specs: &ResolvedSpecs,
        variables: &[VariableDef],
        overrides: Option<&[Selection]>,
    ) -> Result<Document, GenerateError> {
        let selections = match overrides {
            Some(overrides) => overrides.to_vec(),
            None => self.selections(specs)?,
        };

        let variables: Vec<VariableDef> = variables
            .iter()
            .map(|v| VariableDef::new(to_wire(&normalize(&v.name)), v.type_name.clone()))
            .collect();
        let arguments = variables
            .iter()
            .map(|v| Argument {
                name: v.name.clone(),
                value: ArgumentValue::Variable(v.name.clone()),
            })
            .collect();

        Ok(Document {
            kind: OperationKind::Query,
            name: format!("{}Query", operation_name),
            variables,
            root: RootField {
                name: operation_name.to_string(),
                arguments,
                selections: selections.iter().map(Selection::to_wire).collect(),
            },
        })
    }

    /// Build a create-or-update mutation for a values bag.
    ///
    /// The identifier field decides between the create and update operation
    /// names; the response selects the same fields as a read query.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnknownField` if a values key has no resolved
    /// spec, and `GenerateError::DuplicateField` if two keys of one object name
    /// the same field.
    pub fn build_upsert_mutation(
        &self,
        config: &MutationConfig,
        specs: &ResolvedSpecs,
        values: &Map<String, Value>,
    ) -> Result<Document, GenerateError> {
        if let Some(unknown) = values.keys().find(|k| specs.get(&normalize(k)).is_none()) {
            return Err(GenerateError::UnknownField {
                entity: specs.entity().to_string(),
                field: unknown.clone(),
            });
        }

        let data = Value::Object(values.clone());
        if let Some(duplicate) = colliding_key(&data) {
            return Err(GenerateError::DuplicateField {
                entity: specs.entity().to_string(),
                field: duplicate,
            });
        }

        let identifier = specs.primary_key().unwrap_or(DEFAULT_IDENTIFIER);
        let intent = resolve_intent_with(values, identifier);
        let label = label(&config.entity_label);
        let selections = self.selections(specs)?;

        Ok(Document {
            kind: OperationKind::Mutation,
            name: format!("{}Mutation", label),
            variables: Vec::new(),
            root: RootField {
                name: config.operation_name(intent).to_string(),
                arguments: vec![Argument {
                    name: format!("{}Data", label),
                    value: ArgumentValue::Literal(wire_keys(&data)),
                }],
                selections: vec![Selection::Nested {
                    name: label,
                    selections: selections.iter().map(Selection::to_wire).collect(),
                }],
            },
        })
    }

    /// [`build_query`](Self::build_query) for a catalog entity.
    pub fn build_entity_query(
        &self,
        entity: &EntityId,
        operation_name: &str,
        variables: &[VariableDef],
        overrides: Option<&[Selection]>,
    ) -> Result<Document, GenerateError> {
        let specs = self.catalog.resolve(entity)?;
        self.build_query(operation_name, &specs, variables, overrides)
    }

    /// [`build_upsert_mutation`](Self::build_upsert_mutation) for a catalog entity.
    pub fn build_entity_mutation(
        &self,
        entity: &EntityId,
        values: &Map<String, Value>,
    ) -> Result<Document, GenerateError> {
        let config = self.catalog.mutation_config(entity)?;
        let specs = self.catalog.resolve(entity)?;
        self.build_upsert_mutation(config, &specs, values)
    }
}
