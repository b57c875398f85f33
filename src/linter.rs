//! Catalog linting - static analysis of catalog files.
//!
//! Checks catalog files for:
//! - JSON syntax and catalog shape errors
//! - Policy fields missing from the storage model
//! - Storage kinds with no scalar mapping
//! - Cyclic or dangling relations
//! - Uniqueness and mutation-table mismatches (warnings)
//!
//! | Code | Severity | Meaning |
//! |------|----------|---------|
//! | E001 | error | file cannot be loaded as a catalog |
//! | E002 | error | policy names a field the model does not have |
//! | E003 | error | storage kind has no scalar mapping |
//! | E004 | error | relations form a cycle |
//! | E005 | error | relation names an entity absent from the catalog |
//! | W001 | warning | rule marks a field unique/primary, storage does not |
//! | W002 | warning | create/update allowed, no mutation name table |

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::catalog::Catalog;
use crate::error::GenerateError;
use crate::generator::{TypeGenerator, TypeRegistry};
use crate::loader::{load_json, parse_catalog};
use crate::types::{json_type_name, Access, CrudOperation, EntityId, Permission, VALID_OPERATIONS};

/// Keys allowed in a field policy object besides operation names.
const POLICY_KEYS: &[&str] = &["type", "related"];

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON path to the issue (e.g., "/entities/widget/policy/name")
    pub path: String,
    pub message: String,
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileResult {
    fn new(file: PathBuf, diagnostics: Vec<Diagnostic>) -> Self {
        let mut result = Self {
            file,
            status: FileStatus::Ok,
            diagnostics,
        };
        result.status = if result.errors() > 0 {
            FileStatus::Error
        } else if result.warnings() > 0 {
            FileStatus::Warning
        } else {
            FileStatus::Ok
        };
        result
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Errors always fail a file; warnings only in strict mode.
    pub fn fails(&self, strict: bool) -> bool {
        match self.status {
            FileStatus::Ok => false,
            FileStatus::Warning => strict,
            FileStatus::Error => true,
        }
    }
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// A directory is searched recursively for `.json` files. With `strict`,
/// files with warnings count as failed.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let mut files = Vec::new();
    collect_catalog_files(path, &mut files);
    files.sort();

    let results: Vec<FileResult> = files.iter().map(|file| lint_file(file, path)).collect();
    let failed = results.iter().filter(|r| r.fails(strict)).count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: results.len(),
        passed: results.len() - failed,
        failed,
        errors: results.iter().map(FileResult::errors).sum(),
        warnings: results.iter().map(FileResult::warnings).sum(),
        results,
    }
}

/// Lint a single catalog file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let mut linter = FileLinter {
        file,
        diagnostics: Vec::new(),
    };

    match load_json(file) {
        Ok(raw) => {
            linter.check_shape(&raw);
            if linter.diagnostics.is_empty() {
                match parse_catalog(raw) {
                    Ok(catalog) => linter.check_catalog(&catalog),
                    Err(e) => linter.error("E001", "/", e.to_string()),
                }
            }
        }
        Err(e) => linter.error("E001", "/", format!("syntax error: {}", e)),
    }

    FileResult::new(
        file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        linter.diagnostics,
    )
}

struct FileLinter<'a> {
    file: &'a Path,
    diagnostics: Vec<Diagnostic>,
}

impl FileLinter<'_> {
    fn push(&mut self, severity: Severity, code: &str, path: &str, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            code: code.to_string(),
            file: self.file.to_path_buf(),
            path: path.to_string(),
            message,
        });
    }

    fn error(&mut self, code: &str, path: &str, message: String) {
        self.push(Severity::Error, code, path, message);
    }

    fn warning(&mut self, code: &str, path: &str, message: String) {
        self.push(Severity::Warning, code, path, message);
    }

    /// Structural checks on the raw document, with precise paths.
    fn check_shape(&mut self, raw: &Value) {
        let Some(root) = raw.as_object() else {
            self.error(
                "E001",
                "/",
                format!("invalid catalog: expected object, got {}", json_type_name(raw)),
            );
            return;
        };

        let Some(entities) = root.get("entities") else {
            return;
        };
        let Some(entities) = entities.as_object() else {
            self.error(
                "E001",
                "/entities",
                format!("invalid entities: expected object, got {}", json_type_name(entities)),
            );
            return;
        };

        for (id, definition) in entities {
            if let Some(Value::Object(policy)) = definition.get("policy") {
                let path = format!("/entities/{}/policy", id);
                self.check_policy_shape(policy, &path);
            }
        }
    }

    fn check_policy_shape(&mut self, policy: &serde_json::Map<String, Value>, path: &str) {
        for (field, value) in policy {
            let field_path = format!("{}/{}", path, field);
            match value {
                Value::Object(map) => {
                    for (key, item) in map {
                        let key_path = format!("{}/{}", field_path, key);
                        if VALID_OPERATIONS.contains(&key.as_str()) {
                            self.check_rule_shape(item, &key_path);
                        } else if !POLICY_KEYS.contains(&key.as_str()) {
                            self.error(
                                "E001",
                                &key_path,
                                format!(
                                    "unknown policy key \"{}\": expected {}, {}",
                                    key,
                                    VALID_OPERATIONS.join(", "),
                                    POLICY_KEYS.join(", ")
                                ),
                            );
                        }
                    }
                    if let Some(Value::Object(fields)) =
                        map.get("related").and_then(|related| related.get("fields"))
                    {
                        self.check_policy_shape(fields, &format!("{}/related/fields", field_path));
                    }
                }
                other => self.check_rule_shape(other, &field_path),
            }
        }
    }

    fn check_rule_shape(&mut self, rule: &Value, path: &str) {
        let invalid_permission = |s: &str| Permission::parse(s).is_none();
        match rule {
            Value::String(s) if invalid_permission(s) => self.error(
                "E001",
                path,
                format!(
                    "invalid permission \"{}\": expected deny, require, allow, unique, or primary",
                    s
                ),
            ),
            Value::String(_) => {}
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}/{}", path, i);
                    match item {
                        Value::String(_) => self.check_rule_shape(item, &item_path),
                        other => self.error(
                            "E001",
                            &item_path,
                            format!(
                                "invalid permission type: expected string, got {}",
                                json_type_name(other)
                            ),
                        ),
                    }
                }
            }
            other => self.error(
                "E001",
                path,
                format!(
                    "invalid rule type: expected string or list, got {}",
                    json_type_name(other)
                ),
            ),
        }
    }

    /// Resolve and generate every entity against a throwaway registry.
    fn check_catalog(&mut self, catalog: &Catalog) {
        let registry = TypeRegistry::new();
        let generator = TypeGenerator::with_registry(catalog, &registry);
        let ids: Vec<EntityId> = catalog.entity_ids().cloned().collect();

        for id in &ids {
            let entity_path = format!("/entities/{}", id);

            // One generation error per entity; the others repeat it per operation.
            let failed = CrudOperation::ALL
                .iter()
                .find_map(|op| generator.generate_entity(id, *op).err());
            if let Some(err) = failed {
                self.generation_error(id, &entity_path, &err);
                continue;
            }

            let Ok(specs) = catalog.resolve(id) else {
                continue;
            };
            let Ok(definition) = catalog.entity(id) else {
                continue;
            };

            if definition.model.is_some() {
                for spec in specs.iter() {
                    let marks_unique = spec.permissions.values().any(|rule| rule.marks_unique());
                    if marks_unique && spec.uniqueness.is_empty() {
                        self.warning(
                            "W001",
                            &format!("{}/policy/{}", entity_path, spec.name),
                            format!(
                                "field '{}' is marked unique by policy but not by storage",
                                spec.name
                            ),
                        );
                    }
                }
            }

            let writable = specs.iter().any(|spec| {
                spec.access(CrudOperation::Create) != Access::Deny
                    || spec.access(CrudOperation::Update) != Access::Deny
            });
            if writable && definition.mutation.is_none() {
                self.warning(
                    "W002",
                    &entity_path,
                    format!(
                        "entity '{}' allows create/update but declares no mutation name table",
                        id
                    ),
                );
            }
        }
    }

    fn generation_error(&mut self, id: &EntityId, entity_path: &str, err: &GenerateError) {
        let (code, path) = match err {
            GenerateError::UnknownField { entity, field } if entity == id.as_str() => {
                ("E002", format!("{}/policy/{}", entity_path, field))
            }
            GenerateError::UnknownField { .. } | GenerateError::DuplicateField { .. } => {
                ("E002", entity_path.to_string())
            }
            GenerateError::UnsupportedScalarKind { entity, field, .. }
                if entity == id.as_str() =>
            {
                ("E003", format!("{}/policy/{}", entity_path, field))
            }
            GenerateError::UnsupportedScalarKind { .. } => ("E003", entity_path.to_string()),
            GenerateError::CyclicRelation { .. } => ("E004", entity_path.to_string()),
            GenerateError::UnknownEntity { .. } => ("E005", entity_path.to_string()),
            GenerateError::MissingMutationConfig { .. } => ("W002", entity_path.to_string()),
        };
        self.error(code, &path, err.to_string());
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "json")
}

/// Collect `.json` files under `path`, which may itself be a file.
fn collect_catalog_files(path: &Path, files: &mut Vec<PathBuf>) {
    if path.is_file() {
        if is_json(path) {
            files.push(path.to_path_buf());
        }
        return;
    }

    let Ok(entries) = std::fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() || is_json(&entry_path) {
            collect_catalog_files(&entry_path, files);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn lint_str(content: &str) -> FileResult {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        lint_file(file.path(), file.path().parent().unwrap())
    }

    fn codes(result: &FileResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    const VALID: &str = r#"{
        "entities": {
            "widget": {
                "model": { "fields": [
                    { "name": "id", "kind": "AutoField", "primary_key": true },
                    { "name": "name", "kind": "CharField", "unique": true }
                ] },
                "policy": {
                    "id": { "create": "deny", "update": "require" },
                    "name": { "create": ["require", "unique"] }
                },
                "mutation": {
                    "entity_label": "Widget",
                    "operation_names": { "create": "createWidget", "update": "updateWidget" }
                }
            }
        }
    }"#;

    // === Loading ===

    #[test]
    fn lint_valid_catalog() {
        let result = lint_str(VALID);
        assert_eq!(result.status, FileStatus::Ok, "{:?}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn lint_invalid_json_syntax() {
        let result = lint_str("{ not valid json }");
        assert_eq!(result.status, FileStatus::Error);
        assert_eq!(codes(&result), vec!["E001"]);
    }

    #[test]
    fn lint_invalid_permission_value() {
        let result = lint_str(
            r#"{ "entities": { "widget": { "policy": { "id": { "create": "hidden" } } } } }"#,
        );
        assert_eq!(result.status, FileStatus::Error);
        assert_eq!(result.diagnostics[0].code, "E001");
        assert_eq!(result.diagnostics[0].path, "/entities/widget/policy/id/create");
    }

    #[test]
    fn lint_invalid_rule_type() {
        let result = lint_str(r#"{ "entities": { "widget": { "policy": { "id": 5 } } } }"#);
        assert_eq!(codes(&result), vec!["E001"]);
        assert!(result.diagnostics[0].message.contains("got number"));
    }

    #[test]
    fn lint_unknown_policy_key() {
        let result = lint_str(
            r#"{ "entities": { "widget": { "policy": { "id": { "list": "deny" } } } } }"#,
        );
        assert_eq!(codes(&result), vec!["E001"]);
        assert_eq!(result.diagnostics[0].path, "/entities/widget/policy/id/list");
    }

    // === Generation ===

    #[test]
    fn lint_unknown_field() {
        let result = lint_str(
            r#"{ "entities": { "widget": {
                "model": { "fields": [ { "name": "id", "kind": "AutoField" } ] },
                "policy": { "color": "allow" }
            } } }"#,
        );
        assert_eq!(codes(&result), vec!["E002"]);
        assert_eq!(result.diagnostics[0].path, "/entities/widget/policy/color");
    }

    #[test]
    fn lint_unsupported_scalar_kind() {
        let result = lint_str(
            r#"{ "entities": { "widget": {
                "model": { "fields": [ { "name": "shape", "kind": "PolygonField" } ] },
                "policy": { "shape": "allow" }
            } } }"#,
        );
        assert_eq!(codes(&result), vec!["E003"]);
    }

    #[test]
    fn lint_scalar_kind_extension_fixes_mapping() {
        let result = lint_str(
            r#"{ "scalar_kinds": { "PolygonField": "json" }, "entities": { "widget": {
                "model": { "fields": [ { "name": "shape", "kind": "PolygonField" } ] },
                "policy": { "shape": { "create": "deny", "update": "deny" } }
            } } }"#,
        );
        assert_eq!(result.status, FileStatus::Ok, "{:?}", result.diagnostics);
    }

    #[test]
    fn lint_cyclic_relation() {
        let result = lint_str(
            r#"{ "entities": {
                "a": { "policy": { "b": { "related": { "type": "b" } } } },
                "b": { "policy": { "a": { "related": { "type": "a" } } } }
            } }"#,
        );
        assert_eq!(result.status, FileStatus::Error);
        assert_eq!(codes(&result), vec!["E004", "E004"]);
    }

    #[test]
    fn lint_unknown_related_entity() {
        let result = lint_str(
            r#"{ "entities": { "a": { "policy": { "ghost": { "related": { "type": "ghost" } } } } } }"#,
        );
        assert_eq!(codes(&result), vec!["E005"]);
    }

    // === Warnings ===

    #[test]
    fn lint_policy_unique_without_storage_unique() {
        let result = lint_str(
            r#"{ "entities": { "widget": {
                "model": { "fields": [ { "name": "note", "kind": "TextField" } ] },
                "policy": { "note": { "create": ["allow", "unique"], "update": "deny" } }
            } } }"#,
        );
        assert_eq!(result.status, FileStatus::Warning);
        assert_eq!(codes(&result), vec!["W001", "W002"]);
    }

    #[test]
    fn lint_missing_mutation_table_warning() {
        let result = lint_str(
            r#"{ "entities": { "widget": { "policy": { "id": { "type": "integer" } } } } }"#,
        );
        assert_eq!(result.status, FileStatus::Warning);
        assert_eq!(codes(&result), vec!["W002"]);
    }

    #[test]
    fn file_result_counts_by_severity() {
        let result = lint_str(
            r#"{ "entities": { "widget": { "policy": { "id": { "type": "integer" } } } } }"#,
        );
        assert_eq!(result.errors(), 0);
        assert_eq!(result.warnings(), 1);
        assert!(!result.fails(false));
        assert!(result.fails(true));

        let result = lint_str("{ not json }");
        assert_eq!(result.errors(), 1);
        assert!(result.fails(false));
    }

    #[test]
    fn lint_read_only_entity_needs_no_mutation_table() {
        let result = lint_str(
            r#"{ "entities": { "widget": { "policy": {
                "id": { "type": "integer", "create": "deny", "update": "deny" }
            } } } }"#,
        );
        assert_eq!(result.status, FileStatus::Ok);
    }

    // === Directories ===

    #[test]
    fn lint_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("valid.json"), VALID).unwrap();
        std::fs::write(dir.path().join("invalid.json"), "{ not json }").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let result = lint(dir.path(), false);
        assert_eq!(result.files_checked, 2);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors, 1);
        assert!(!result.is_ok());
    }

    #[test]
    fn lint_nested_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("shop").join("catalogs");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("valid.json"), VALID).unwrap();
        std::fs::write(dir.path().join("valid.json"), VALID).unwrap();

        let result = lint(dir.path(), false);
        assert_eq!(result.files_checked, 2);
        assert_eq!(
            result.results[0].file,
            PathBuf::from("shop").join("catalogs").join("valid.json")
        );
        assert!(result.is_ok());
    }

    #[test]
    fn lint_strict_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("catalog.json");
        // Warning only (no mutation table)
        std::fs::write(
            &file_path,
            r#"{ "entities": { "widget": { "policy": { "id": { "type": "integer" } } } } }"#,
        )
        .unwrap();

        let result = lint(&file_path, false);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);

        let result = lint(&file_path, true);
        assert_eq!(result.passed, 0);
        assert_eq!(result.failed, 1);
    }
}
