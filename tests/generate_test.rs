//! Integration tests for type generation, partitioning and documents.

use crud_policy::{
    internal_keys, json_schema, load_catalog, normalize, partition, resolve_intent, to_internal,
    to_wire, validate_values, Access, Catalog, CrudOperation, DocumentBuilder, EntityDefinition,
    EntityId, EntityPolicy, FieldPolicy, FieldType, GenerateError, ModelDescription, ModelField,
    MutationIntent, Permission, RelationPolicy, ScalarKind, TypeGenerator, TypeRegistry,
    VariableDef,
};
use serde_json::{json, Map, Value};

const FIXTURE: &str = "tests/fixtures/catalog.json";

fn fixture() -> Catalog {
    load_catalog(FIXTURE).unwrap()
}

fn bag(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

// === Policy Loading Tests ===

mod policy_loading {
    use super::*;

    #[test]
    fn shorthand_applies_to_every_operation() {
        let policy: EntityPolicy = serde_json::from_value(json!({ "note": "deny" })).unwrap();
        let note = policy.get("note").unwrap();
        for op in CrudOperation::ALL {
            assert_eq!(note.access(op), Access::Deny);
        }
    }

    #[test]
    fn rule_lists_combine_permissions() {
        let policy: EntityPolicy =
            serde_json::from_value(json!({ "name": { "create": ["require", "unique"] } })).unwrap();
        let rule = policy.get("name").unwrap().rule(CrudOperation::Create).unwrap();
        assert_eq!(rule.access(), Access::Require);
        assert!(rule.marks_unique());
    }

    #[test]
    fn unset_operation_is_allowed() {
        let policy: EntityPolicy =
            serde_json::from_value(json!({ "name": { "create": "require" } })).unwrap();
        assert_eq!(
            policy.get("name").unwrap().access(CrudOperation::Update),
            Access::Allow
        );
    }

    #[test]
    fn declaration_order_is_kept() {
        let policy: EntityPolicy =
            serde_json::from_value(json!({ "zeta": "allow", "alpha": "allow", "mid": "allow" }))
                .unwrap();
        let names: Vec<&str> = policy.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn unknown_permission_rejected() {
        let result = serde_json::from_value::<EntityPolicy>(json!({ "name": "hidden" }));
        assert!(result.is_err());
    }
}

// === Generation Tests ===

mod generation {
    use super::*;

    #[test]
    fn create_type_from_fixture() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let handle = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("user"), CrudOperation::Create)
            .unwrap();

        assert_eq!(
            handle.render_sdl(),
            "input UserCreateInputType {\n  username: String!\n  firstName: String\n  \
             email: String!\n  location: JSONString\n  group: UserGroupRelatedCreateInputType\n}\n\n\
             input UserGroupRelatedCreateInputType {\n  id: Int!\n  name: String\n}"
        );
    }

    #[test]
    fn deny_never_included() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let generator = TypeGenerator::with_registry(&catalog, &registry);
        let specs = catalog.resolve(&EntityId::new("user")).unwrap();

        for op in CrudOperation::ALL {
            let handle = generator.generate_entity(&EntityId::new("user"), op).unwrap();
            for spec in specs.iter() {
                match spec.access(op) {
                    Access::Deny => assert!(handle.field(&spec.name).is_none()),
                    Access::Require => assert!(handle.field(&spec.name).unwrap().required),
                    Access::Allow => assert!(!handle.field(&spec.name).unwrap().required),
                }
            }
        }
    }

    #[test]
    fn update_requires_identifier() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let handle = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("user"), CrudOperation::Update)
            .unwrap();

        let required: Vec<&str> = handle.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(required, vec!["id"]);
        assert!(handle.field("date_joined").is_none());
    }

    #[test]
    fn unknown_field_in_policy() {
        let catalog = Catalog::new().with_entity(
            "widget",
            EntityDefinition::new(EntityPolicy::new().with_field("color", FieldPolicy::new()))
                .with_model(
                    ModelDescription::new().with_field(ModelField::new("id", "AutoField")),
                ),
        );
        let registry = TypeRegistry::new();
        let result = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("widget"), CrudOperation::Read);

        assert!(matches!(
            result,
            Err(GenerateError::UnknownField { field, .. }) if field == "color"
        ));
    }

    #[test]
    fn cyclic_full_relations() {
        let catalog = Catalog::new()
            .with_entity(
                "a",
                EntityDefinition::new(
                    EntityPolicy::new()
                        .with_field("b", FieldPolicy::new().related(RelationPolicy::full("b"))),
                ),
            )
            .with_entity(
                "b",
                EntityDefinition::new(
                    EntityPolicy::new()
                        .with_field("a", FieldPolicy::new().related(RelationPolicy::full("a"))),
                ),
            );
        let registry = TypeRegistry::new();
        let result = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("a"), CrudOperation::Create);

        assert!(matches!(result, Err(GenerateError::CyclicRelation { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn query_arguments_are_optional() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let specs = catalog.resolve(&EntityId::new("user")).unwrap();
        let args = TypeGenerator::with_registry(&catalog, &registry)
            .query_arguments(&specs)
            .unwrap();

        assert_eq!(args.len(), specs.len());
        assert!(args.iter().all(|arg| !arg.required));
        let group = args.iter().find(|arg| arg.name == "group").unwrap();
        assert_eq!(group.ty.name(), "UserGroupRelatedReadInputType");
    }
}

// === Identity Tests ===

mod identity {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn catalog(id: &str) -> Catalog {
        Catalog::new().with_entity(
            id,
            EntityDefinition::new(
                EntityPolicy::new()
                    .with_field("id", FieldPolicy::new().scalar(ScalarKind::Integer)),
            ),
        )
    }

    #[test]
    fn global_registry_returns_same_handle() {
        let catalog = catalog("identity_global_gadget");
        let id = EntityId::new("identity_global_gadget");

        let first = TypeGenerator::new(&catalog)
            .generate_entity(&id, CrudOperation::Read)
            .unwrap();
        let second = TypeGenerator::new(&catalog)
            .generate_entity(&id, CrudOperation::Read)
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert!(TypeRegistry::global().len() >= 1);
    }

    #[test]
    fn operations_get_distinct_handles() {
        let catalog = catalog("gadget");
        let registry = TypeRegistry::new();
        let generator = TypeGenerator::with_registry(&catalog, &registry);
        let id = EntityId::new("gadget");

        let create = generator.generate_entity(&id, CrudOperation::Create).unwrap();
        let update = generator.generate_entity(&id, CrudOperation::Update).unwrap();
        assert!(!create.ptr_eq(&update));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_first_use_has_one_winner() {
        let catalog = Arc::new(fixture());
        let registry = Arc::new(TypeRegistry::new());
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (catalog, registry, barrier) =
                    (Arc::clone(&catalog), Arc::clone(&registry), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    TypeGenerator::with_registry(&catalog, &registry)
                        .generate_entity(&EntityId::new("user"), CrudOperation::Create)
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|handle| handle.ptr_eq(&results[0])));
        // user + nested group type
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn owners_inlining_one_entity_get_their_own_types() {
        let user_model = ModelDescription::new()
            .with_field(ModelField::new("id", "AutoField").primary_key())
            .with_field(ModelField::new("username", "CharField").unique());
        let id_only = EntityPolicy::new().with_field("id", FieldPolicy::new());
        let with_username = EntityPolicy::new()
            .with_field("id", FieldPolicy::new())
            .with_field(
                "username",
                FieldPolicy::new().with(CrudOperation::Create, Permission::Require),
            );
        let owned_by = |nested: EntityPolicy| {
            EntityDefinition::new(EntityPolicy::new().with_field(
                "owner",
                FieldPolicy::new().related(RelationPolicy::inline("user", nested)),
            ))
        };
        let catalog = Catalog::new()
            .with_entity("user", EntityDefinition::new(EntityPolicy::new()).with_model(user_model))
            .with_entity("widget", owned_by(id_only))
            .with_entity("gadget", owned_by(with_username));
        let registry = TypeRegistry::new();
        let generator = TypeGenerator::with_registry(&catalog, &registry);

        let widget = generator
            .generate_entity(&EntityId::new("widget"), CrudOperation::Create)
            .unwrap();
        let gadget = generator
            .generate_entity(&EntityId::new("gadget"), CrudOperation::Create)
            .unwrap();

        let FieldType::Object(widget_owner) = &widget.field("owner").unwrap().ty else {
            panic!("owner should be an object type");
        };
        let FieldType::Object(gadget_owner) = &gadget.field("owner").unwrap().ty else {
            panic!("owner should be an object type");
        };
        assert!(!widget_owner.ptr_eq(gadget_owner));
        assert_eq!(widget_owner.name(), "WidgetOwnerRelatedCreateInputType");
        assert!(widget_owner.field("username").is_none());
        assert_eq!(gadget_owner.name(), "GadgetOwnerRelatedCreateInputType");
        assert!(gadget_owner.field("username").unwrap().required);
    }
}

// === Naming Tests ===

mod naming {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        let names = [
            "id",
            "first_name",
            "address_line1",
            "address_line2",
            "point2d",
            "x1_y2",
            "a_b_c",
            "ipv6_address",
        ];
        for name in names {
            let wire = to_wire(name);
            assert_eq!(to_internal(&wire), name, "{} -> {}", name, wire);
            assert_eq!(normalize(&wire), name);
        }
    }

    #[test]
    fn partition_accepts_wire_key_with_digit() {
        let model = ModelDescription::new()
            .with_field(ModelField::new("id", "AutoField").primary_key())
            .with_field(ModelField::new("address_line1", "CharField"));
        let policy = EntityPolicy::new()
            .with_field("id", FieldPolicy::new())
            .with_field("address_line1", FieldPolicy::new());
        let catalog = Catalog::new()
            .with_entity("site", EntityDefinition::new(policy).with_model(model));
        let specs = catalog.resolve(&EntityId::new("site")).unwrap();

        let params = partition(&specs, &bag(json!({ "addressLine1": "1 Main St" }))).unwrap();
        assert_eq!(params.defaults, bag(json!({ "address_line1": "1 Main St" })));
        assert_eq!(
            internal_keys(&json!({ "site": { "addressLine1": "1 Main St" } })),
            json!({ "site": { "address_line1": "1 Main St" } })
        );
    }

    #[test]
    fn partition_rejects_field_in_both_forms() {
        let catalog = fixture();
        let specs = catalog.resolve(&EntityId::new("user")).unwrap();
        let values = bag(json!({ "first_name": "Ann", "firstName": "Bea" }));

        let result = partition(&specs, &values);
        assert!(matches!(
            result,
            Err(GenerateError::DuplicateField { field, .. }) if field == "firstName"
        ));
    }
}

// === Upsert Tests ===

mod upsert {
    use super::*;

    #[test]
    fn intent_examples() {
        assert_eq!(
            resolve_intent(&bag(json!({ "id": 5, "name": "x" }))),
            MutationIntent::Update
        );
        assert_eq!(
            resolve_intent(&bag(json!({ "name": "x" }))),
            MutationIntent::Create
        );
    }

    #[test]
    fn partition_uses_storage_uniqueness() {
        let catalog = fixture();
        let specs = catalog.resolve(&EntityId::new("user")).unwrap();
        let values = bag(json!({
            "username": "ann",
            "firstName": "Ann",
            "email": "ann@example.org",
            "location": { "lat": 1.0 }
        }));

        let params = partition(&specs, &values).unwrap();
        assert_eq!(
            params.match_keys,
            bag(json!({ "username": "ann", "first_name": "Ann", "email": "ann@example.org" }))
        );
        assert_eq!(params.defaults, bag(json!({ "location": { "lat": 1.0 } })));
    }

    #[test]
    fn partition_unknown_key() {
        let catalog = fixture();
        let specs = catalog.resolve(&EntityId::new("user")).unwrap();
        let result = partition(&specs, &bag(json!({ "password": "x" })));
        assert!(matches!(result, Err(GenerateError::UnknownField { .. })));
    }
}

// === Document Tests ===

mod documents {
    use super::*;

    #[test]
    fn read_query_with_variable() {
        let catalog = fixture();
        let document = DocumentBuilder::new(&catalog)
            .build_entity_query(
                &EntityId::new("user"),
                "user",
                &[VariableDef::new("id", "Int")],
                None,
            )
            .unwrap();

        assert_eq!(
            document.to_string(),
            "query userQuery($id: Int!) {\n  user(id: $id) {\n    id\n    username\n    \
             firstName\n    email\n    dateJoined\n    location\n    group {\n      id\n      \
             name\n    }\n  }\n}"
        );
    }

    #[test]
    fn update_mutation_for_identified_values() {
        let catalog = fixture();
        let document = DocumentBuilder::new(&catalog)
            .build_entity_mutation(
                &EntityId::new("group"),
                &bag(json!({ "id": 3, "name": "staff" })),
            )
            .unwrap();

        assert_eq!(
            document.to_string(),
            "mutation groupMutation {\n  updateGroup(groupData: {id: 3, name: \"staff\"}) {\n    \
             group {\n      id\n      name\n    }\n  }\n}"
        );
    }

    #[test]
    fn create_mutation_converts_nested_keys() {
        let catalog = fixture();
        let document = DocumentBuilder::new(&catalog)
            .build_entity_mutation(
                &EntityId::new("user"),
                &bag(json!({ "username": "ann", "first_name": "Ann", "group": { "id": 2 } })),
            )
            .unwrap();

        let text = document.to_string();
        assert!(text.starts_with("mutation userMutation {\n  createUser(userData: "));
        assert!(text.contains(r#"{username: "ann", firstName: "Ann", group: {id: 2}}"#));
    }

    #[test]
    fn mutation_without_name_table() {
        let catalog = Catalog::new().with_entity(
            "gadget",
            EntityDefinition::new(
                EntityPolicy::new()
                    .with_field("id", FieldPolicy::new().scalar(ScalarKind::Integer)),
            ),
        );
        let result = DocumentBuilder::new(&catalog)
            .build_entity_mutation(&EntityId::new("gadget"), &bag(json!({ "id": 1 })));
        assert!(matches!(
            result,
            Err(GenerateError::MissingMutationConfig { .. })
        ));
    }

    #[test]
    fn raw_results_convert_back() {
        let raw = json!({ "user": { "firstName": "Ann", "dateJoined": "2024-01-01T00:00:00Z" } });
        assert_eq!(
            internal_keys(&raw),
            json!({ "user": { "first_name": "Ann", "date_joined": "2024-01-01T00:00:00Z" } })
        );
    }
}

// === Validation Tests ===

mod validation {
    use super::*;

    #[test]
    fn schema_for_fixture_update() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let handle = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("user"), CrudOperation::Update)
            .unwrap();
        let schema = json_schema(&handle);

        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["properties"]["location"], json!({}));
        assert!(schema["$defs"].get("UserGroupRelatedUpdateInputType").is_some());
    }

    #[test]
    fn values_checked_against_create_type() {
        let (catalog, registry) = (fixture(), TypeRegistry::new());
        let handle = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("user"), CrudOperation::Create)
            .unwrap();

        assert!(validate_values(&handle, &json!({ "username": "ann", "email": "a@b.c" })).is_ok());
        assert!(validate_values(&handle, &json!({ "username": "ann" })).is_err());
        assert!(validate_values(
            &handle,
            &json!({ "username": "ann", "email": "a@b.c", "group": {} })
        )
        .is_err());
    }

    #[test]
    fn explicit_permission_builders() {
        let policy = EntityPolicy::new().with_field(
            "code",
            FieldPolicy::new()
                .scalar(ScalarKind::Text)
                .with(CrudOperation::Create, Permission::Require),
        );
        let catalog = Catalog::new().with_entity("coupon", EntityDefinition::new(policy));
        let registry = TypeRegistry::new();
        let handle = TypeGenerator::with_registry(&catalog, &registry)
            .generate_entity(&EntityId::new("coupon"), CrudOperation::Create)
            .unwrap();

        assert!(validate_values(&handle, &json!({ "code": "X1" })).is_ok());
        assert!(validate_values(&handle, &json!({ "code": 1 })).is_err());
    }
}
