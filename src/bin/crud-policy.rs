//! CRUD Policy CLI
//!
//! Command-line interface for generating types and documents from a catalog.

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use crud_policy::{
    json_schema, lint, load_catalog, load_values, partition, resolve_intent_with,
    validate_entity_values, validate_values, Catalog, CrudOperation, DocumentBuilder, EntityId,
    FileStatus, GenerateError, Selection, Severity, TypeGenerator, ValidateError, VariableDef,
    VALID_OPERATIONS,
};
use serde_json::{json, Map, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "crud-policy")]
#[command(about = "Generate CRUD input types and GraphQL documents from field policies")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. debug, crud_policy=trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeFormat {
    Sdl,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the input type of an entity for an operation
    Types {
        /// Catalog source: file path or URL (http:// or https://)
        catalog: String,

        /// Entity id in the catalog
        entity: String,

        /// Operation to generate for (create, read, update, delete)
        #[arg(
            long,
            short,
            value_parser = parse_operation,
            required_unless_present = "arguments"
        )]
        op: Option<CrudOperation>,

        /// Output format
        #[arg(long, value_enum, default_value_t = TypeFormat::Sdl)]
        format: TypeFormat,

        /// Print the allowed query arguments instead of the type
        #[arg(long)]
        arguments: bool,
    },

    /// Build a read query document
    Query {
        catalog: String,

        entity: String,

        /// Root field name of the query (e.g. widget, allWidgets)
        #[arg(long)]
        name: String,

        /// Query variable as name:Type, repeatable
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<VariableDef>,

        /// Select only these fields, repeatable (default: every field)
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Build a create-or-update mutation document for a values bag
    Mutation {
        catalog: String,

        entity: String,

        /// Values: inline JSON object, file path, or URL
        #[arg(long)]
        values: String,
    },

    /// Split a values bag into upsert match keys and defaults
    Partition {
        catalog: String,

        entity: String,

        /// Values: inline JSON object, file path, or URL
        #[arg(long)]
        values: String,
    },

    /// Validate a values bag against the generated input type
    Validate {
        catalog: String,

        entity: String,

        /// Values: inline JSON object, file path, or URL
        #[arg(long)]
        values: String,

        /// Operation to validate for (default: inferred from the identifier field)
        #[arg(long, short, value_parser = parse_operation)]
        op: Option<CrudOperation>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Lint catalog files for errors (syntax, unknown fields, cycles, mappings)
    Lint {
        /// File or directory to lint
        path: std::path::PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn parse_operation(s: &str) -> Result<CrudOperation, String> {
    CrudOperation::parse(s).ok_or_else(|| {
        format!(
            "unknown operation \"{}\": expected {}",
            s,
            VALID_OPERATIONS.join(", ")
        )
    })
}

fn parse_variable(s: &str) -> Result<VariableDef, String> {
    VariableDef::parse(s).ok_or_else(|| format!("expected name:Type, got \"{}\"", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Types {
            catalog,
            entity,
            op,
            format,
            arguments,
        } => run_types(&catalog, &entity, op, format, arguments),

        Commands::Query {
            catalog,
            entity,
            name,
            variables,
            fields,
        } => run_query(&catalog, &entity, &name, &variables, &fields),

        Commands::Mutation {
            catalog,
            entity,
            values,
        } => run_mutation(&catalog, &entity, &values),

        Commands::Partition {
            catalog,
            entity,
            values,
        } => run_partition(&catalog, &entity, &values),

        Commands::Validate {
            catalog,
            entity,
            values,
            op,
            json,
        } => run_validate(&catalog, &entity, &values, op, json),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Log to stderr so stdout stays clean for generated output.
fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_catalog(source: &str) -> Result<Catalog, u8> {
    load_catalog(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn open_values(source: &str) -> Result<Map<String, Value>, u8> {
    load_values(source).map_err(|e| {
        eprintln!("Error loading values: {}", e);
        e.exit_code() as u8
    })
}

fn generate_failed(e: GenerateError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn to_pretty(value: &Value) -> Result<String, u8> {
    serde_json::to_string_pretty(value).map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn run_types(
    catalog_source: &str,
    entity: &str,
    op: Option<CrudOperation>,
    format: TypeFormat,
    arguments: bool,
) -> Result<(), u8> {
    let catalog = open_catalog(catalog_source)?;
    let entity = EntityId::new(entity);
    let generator = TypeGenerator::new(&catalog);

    if arguments {
        let specs = catalog.resolve(&entity).map_err(generate_failed)?;
        let args = generator.query_arguments(&specs).map_err(generate_failed)?;
        for arg in args {
            println!("{}: {}", arg.wire_name(), arg.ty.name());
        }
        return Ok(());
    }

    let Some(op) = op else {
        eprintln!("Error: --op is required");
        return Err(2);
    };
    let handle = generator
        .generate_entity(&entity, op)
        .map_err(generate_failed)?;

    match format {
        TypeFormat::Sdl => println!("{}", handle.render_sdl()),
        TypeFormat::Json => println!("{}", to_pretty(&json_schema(&handle))?),
    }
    Ok(())
}

fn run_query(
    catalog_source: &str,
    entity: &str,
    name: &str,
    variables: &[VariableDef],
    fields: &[String],
) -> Result<(), u8> {
    let catalog = open_catalog(catalog_source)?;
    let overrides: Vec<Selection> = fields.iter().map(Selection::field).collect();
    let overrides = (!overrides.is_empty()).then_some(overrides.as_slice());

    let document = DocumentBuilder::new(&catalog)
        .build_entity_query(&EntityId::new(entity), name, variables, overrides)
        .map_err(generate_failed)?;
    println!("{}", document);
    Ok(())
}

fn run_mutation(catalog_source: &str, entity: &str, values_source: &str) -> Result<(), u8> {
    let catalog = open_catalog(catalog_source)?;
    let values = open_values(values_source)?;

    let document = DocumentBuilder::new(&catalog)
        .build_entity_mutation(&EntityId::new(entity), &values)
        .map_err(generate_failed)?;
    println!("{}", document);
    Ok(())
}

fn run_partition(catalog_source: &str, entity: &str, values_source: &str) -> Result<(), u8> {
    let catalog = open_catalog(catalog_source)?;
    let values = open_values(values_source)?;
    let entity = EntityId::new(entity);

    let identifier = catalog.identifier_field(&entity).map_err(generate_failed)?;
    let specs = catalog.resolve(&entity).map_err(generate_failed)?;
    let params = partition(&specs, &values).map_err(generate_failed)?;

    let output = json!({
        "intent": resolve_intent_with(&values, &identifier),
        "match_keys": params.match_keys,
        "defaults": params.defaults,
    });
    println!("{}", to_pretty(&output)?);
    Ok(())
}

fn run_validate(
    catalog_source: &str,
    entity: &str,
    values_source: &str,
    op: Option<CrudOperation>,
    json_output: bool,
) -> Result<(), u8> {
    let catalog = open_catalog(catalog_source)?;
    let values = open_values(values_source)?;
    let entity = EntityId::new(entity);
    let generator = TypeGenerator::new(&catalog);

    let result = match op {
        Some(op) => generator
            .generate_entity(&entity, op)
            .map_err(ValidateError::from)
            .and_then(|handle| {
                validate_values(&handle, &Value::Object(values.clone()))?;
                Ok(handle)
            }),
        None => validate_entity_values(&generator, &entity, &values),
    };

    match result {
        Ok(handle) => {
            if json_output {
                println!("{}", json!({ "valid": true, "type": handle.name() }));
            } else {
                println!("Valid ({})", handle.name());
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                println!("{}", json!({ "valid": false, "errors": errors }));
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, strict);

    if format == "json" {
        let output = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
