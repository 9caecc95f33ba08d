// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use crosswire::*;

fn engine(units: &[(&str, &str)]) -> Result<Engine> {
    let mut engine = Engine::new();
    for (path, text) in units {
        engine.add_unit(path.to_string(), text.to_string())?;
    }
    Ok(engine)
}

fn identifiers(decls: &[crosswire::Rc<Declaration>]) -> Vec<String> {
    decls.iter().map(|d| d.identifier().to_string()).collect()
}

// Scenario: a unit declaring N, a unit declaring A that uses N.
#[test]
fn load_order_follows_dependencies() -> Result<()> {
    let mut engine = engine(&[
        ("net.cw", r#"decl N: "net.vpc" { cidr = "10.0.0.0/16" }"#),
        ("app.cw", r#"decl A: "compute.instance" { net = N }"#),
    ])?;

    let order: Vec<String> = engine
        .load_order()?
        .iter()
        .flat_map(|s| s.units.iter().map(|u| u.to_string()))
        .collect();
    assert_eq!(order, ["net.cw", "app.cw"]);

    engine.load()?;
    let a = engine.registry().get("A").unwrap();
    let deps = get_dependencies(&a);
    assert_eq!(deps, ["N".to_string()].into_iter().collect());
    Ok(())
}

// Discovery order is the only tie-break, so the order of add_unit calls is
// the order that surfaces everywhere.
#[test]
fn repeated_runs_produce_identical_orders() -> Result<()> {
    let units = [
        ("z.cw", r#"decl Z: "t" { dep = M }"#),
        ("m.cw", r#"decl M: "t" { v = 1 }"#),
        ("q.cw", r#"decl Q: "t" { dep = M }"#),
        ("r.cw", r#"decl R: "t" { deps = [Z, Q] }"#),
    ];
    let first = engine(&units)?.load_order()?;
    for _ in 0..10 {
        assert_eq!(engine(&units)?.load_order()?, first);
    }

    let mut e1 = engine(&units)?;
    let mut e2 = engine(&units)?;
    e1.load()?;
    e2.load()?;
    assert_eq!(
        identifiers(&e1.declarations()),
        identifiers(&e2.declarations())
    );
    assert_eq!(e1.creation_order()?, e2.creation_order()?);
    Ok(())
}

// Scenario: two units that use each other's declarations merge into one
// load step; the declarations emit as one cycle group with a warning.
#[test]
fn unit_cycle_merges_and_emits_grouped() -> Result<()> {
    let mut engine = engine(&[
        ("a.cw", r#"decl X: "t" { peer = Y }"#),
        ("b.cw", r#"decl Y: "t" { peer = X }"#),
    ])?;

    let steps = engine.load_order()?;
    assert_eq!(steps.len(), 1);
    assert!(steps[0].is_merged_cycle());

    engine.load()?;
    assert_eq!(engine.registry().len(), 2);

    let (groups, warnings) = engine.emit_order()?;
    assert_eq!(
        groups,
        vec![EmitGroup::Cycle(vec!["X".to_string(), "Y".to_string()])]
    );
    assert_eq!(warnings.len(), 1);
    assert!(!warnings[0].is_fatal());
    assert!(matches!(
        &warnings[0],
        ValidationError::Cycle { members } if members == &["X".to_string(), "Y".to_string()]
    ));
    Ok(())
}

// Scenario: a list-of-names field becomes a single list reference.
#[test]
fn list_field_is_one_list_reference() -> Result<()> {
    let mut engine = engine(&[
        ("p.cw", r#"decl P: "t" { v = 1 }"#),
        ("q.cw", r#"decl Q: "t" { v = 2 }"#),
        ("c.cw", r#"decl Z: "t" { ref = [P, Q] }"#),
    ])?;
    engine.load()?;

    let z = engine.registry().get("Z").unwrap();
    let refs = get_refs(&z);
    assert_eq!(refs.len(), 1);
    assert_eq!(
        refs["ref"],
        Reference::List {
            targets: vec!["P".to_string(), "Q".to_string()],
        }
    );
    assert_eq!(
        get_dependencies(&z),
        ["P".to_string(), "Q".to_string()].into_iter().collect()
    );
    Ok(())
}

// Scenario: a name declared nowhere fails validation before anything runs.
#[test]
fn missing_name_aborts_before_execution() -> Result<()> {
    let mut engine = engine(&[
        ("net.cw", r#"decl N: "t" { v = 1 }"#),
        ("app.cw", r#"decl A: "t" { net = Missing }"#),
    ])?;

    let errors = engine.validate();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ValidationError::UnresolvedReference { unit, decl, field, target }
            if unit == "app.cw" && decl == "A" && field == "net" && target == "Missing"
    ));

    let err = engine.load().unwrap_err();
    assert!(format!("{err}").contains("Missing"), "{err}");
    // no unit executed: nothing registered, not even N
    assert!(engine.registry().is_empty());
    assert!(engine.executed_units().is_empty());
    Ok(())
}

#[test]
fn duplicate_identifiers_abort_the_load() -> Result<()> {
    let mut engine = engine(&[
        ("a.cw", r#"decl X: "t" { v = 1 }"#),
        ("b.cw", r#"decl X: "t" { v = 2 }"#),
    ])?;
    let errors = engine.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_fatal());
    assert!(engine.load().is_err());
    assert!(engine.registry().is_empty());
    Ok(())
}

#[test]
fn all_reference_shapes_survive_loading() -> Result<()> {
    let mut engine = engine(&[
        (
            "net.cw",
            r#"
            decl NetVpc: "net.vpc" { cidr = "10.0.0.0/16" }
            decl NetA: "net.subnet" { vpc = NetVpc }
            decl NetB: "net.subnet" { vpc = NetVpc }
            "#,
        ),
        (
            "iam.cw",
            r#"decl AppRole: "iam.role" { name = "app" }"#,
        ),
        (
            "app.cw",
            r#"
            decl App: "compute.instance" {
                subnet = NetA
                role = AppRole.arn
                nets = [NetA, NetB]
                routes = {"primary": NetA, "backup": NetB}
                region = ctx("region")
                count = 3
                tags = {"team": "infra"}
            }
            "#,
        ),
    ])?;
    engine.load()?;

    let app = engine.registry().get("App").unwrap();
    let refs = get_refs(&app);
    assert_eq!(
        refs["subnet"],
        Reference::Direct {
            target: "NetA".to_string()
        }
    );
    assert_eq!(
        refs["role"],
        Reference::Attribute {
            target: "AppRole".to_string(),
            attr: "arn".to_string()
        }
    );
    assert!(matches!(refs["nets"], Reference::List { .. }));
    assert!(matches!(refs["routes"], Reference::Dict { .. }));
    assert_eq!(
        refs["region"],
        Reference::Context {
            key: "region".to_string()
        }
    );

    // literal fields are literals, not references
    assert!(!refs.contains_key("count"));
    assert!(!refs.contains_key("tags"));

    // context references are not dependencies
    let deps = get_dependencies(&app);
    assert_eq!(
        deps,
        ["NetA", "NetB", "AppRole"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    );
    Ok(())
}

#[test]
fn emit_order_places_dependencies_first() -> Result<()> {
    let mut engine = engine(&[
        ("app.cw", r#"decl App: "t" { net = Net sub = Sub }"#),
        ("net.cw", r#"decl Net: "t" { v = 1 }
                      decl Sub: "t" { net = Net }"#),
    ])?;
    engine.load()?;

    let order = engine.creation_order()?;
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("Net") < pos("Sub"));
    assert!(pos("Sub") < pos("App"));

    // every declaration appears after everything it transitively references
    for decl in engine.declarations() {
        for dep in get_transitive_dependencies(&decl, engine.registry()) {
            assert!(pos(&dep) < pos(decl.identifier()), "{dep} must precede");
        }
    }

    let mut reversed = order.clone();
    reversed.reverse();
    assert_eq!(engine.deletion_order()?, reversed);
    Ok(())
}

#[test]
fn transitive_dependencies_are_a_superset() -> Result<()> {
    let mut engine = engine(&[
        ("a.cw", r#"decl A: "t" { b = B }"#),
        ("b.cw", r#"decl B: "t" { c = C }"#),
        ("c.cw", r#"decl C: "t" { a = A }"#),
    ])?;
    engine.load()?;

    let a = engine.registry().get("A").unwrap();
    let direct = get_dependencies(&a);
    let transitive = get_transitive_dependencies(&a, engine.registry());
    assert!(transitive.is_superset(&direct));
    // A participates in the cycle but never depends on itself
    assert!(!transitive.contains("A"));
    Ok(())
}

#[test]
fn scope_filters_declarations() -> Result<()> {
    let mut engine = engine(&[
        (
            "all.cw",
            r#"
            decl NetVpc: "t" { v = 1 }
            decl AppServer: "t" { net = NetVpc }
            decl NetSubnet: "t" { net = NetVpc }
            "#,
        ),
    ])?;
    engine.set_scope("Net");
    engine.load()?;

    assert_eq!(identifiers(&engine.declarations()), ["NetVpc", "NetSubnet"]);
    // the registry itself stays unfiltered
    assert_eq!(engine.registry().len(), 3);
    Ok(())
}

#[test]
fn framework_symbols_inject_as_literals() -> Result<()> {
    let mut engine = engine(&[(
        "app.cw",
        r#"decl A: "t" { environment = build_environment }"#,
    )])?;
    engine.add_framework_symbol("build_environment", Value::from("production"));

    assert!(engine.validate().is_empty());
    engine.load()?;

    let a = engine.registry().get("A").unwrap();
    assert_eq!(
        a.field("environment").unwrap().as_literal(),
        Some(&Value::from("production"))
    );
    Ok(())
}

#[test]
fn context_values_resolve_at_emit_time() -> Result<()> {
    let mut engine = engine(&[(
        "app.cw",
        r#"decl A: "t" { region = ctx("region") }"#,
    )])?;
    engine.set_context(Context::new().with("region", Value::from("eu-north-1")));
    engine.load()?;

    let a = engine.registry().get("A").unwrap();
    let reference = a.field("region").unwrap().as_ref().unwrap();
    assert_eq!(
        engine.context().resolve(reference),
        Some(&Value::from("eu-north-1"))
    );
    Ok(())
}

#[test]
fn schema_hints_turn_scalars_into_references() -> Result<()> {
    let mut engine = engine(&[
        ("net.cw", r#"decl NetSubnet: "net.subnet" { v = 1 }"#),
        (
            "app.cw",
            r#"
            decl App: "compute.instance" {
                subnet = "NetSubnet"
                image = "ami-0aa/7f1"
            }
            "#,
        ),
    ])?;
    let mut hints = SchemaHints::new();
    hints.mark_reference("compute.instance", "subnet");
    hints.mark_reference("compute.instance", "image");
    engine.set_schema_hints(hints)?;

    let order: Vec<String> = engine
        .load_order()?
        .iter()
        .flat_map(|s| s.units.iter().map(|u| u.to_string()))
        .collect();
    assert_eq!(order, ["net.cw", "app.cw"]);

    engine.load()?;
    let app = engine.registry().get("App").unwrap();
    assert_eq!(
        app.field("subnet").unwrap().as_ref(),
        Some(&Reference::Direct {
            target: "NetSubnet".to_string()
        })
    );
    // the non-identifier string stays a literal
    assert!(app.field("image").unwrap().as_literal().is_some());
    Ok(())
}

#[test]
fn mixed_list_fails_at_the_offending_unit() -> Result<()> {
    let mut engine = engine(&[
        ("n.cw", r#"decl N: "t" { v = 1 }"#),
        ("bad.cw", r#"decl Bad: "t" { xs = [N, "literal"] }"#),
    ])?;
    let err = engine.load().unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("failed to load unit bad.cw"), "{msg}");
    assert!(msg.contains("mixes references and literals"), "{msg}");

    // the failing unit registered nothing; the earlier unit's registration
    // is retained, though the load as a whole failed
    assert!(engine.registry().get("Bad").is_none());
    assert!(engine.registry().contains("N"));
    Ok(())
}

#[test]
fn loading_twice_is_an_error() -> Result<()> {
    let mut engine = engine(&[("a.cw", r#"decl A: "t" { v = 1 }"#)])?;
    engine.load()?;
    assert!(engine.load().is_err());
    Ok(())
}

#[test]
fn forward_reference_within_a_unit_loads() -> Result<()> {
    let mut engine = engine(&[(
        "one.cw",
        r#"
        decl First: "t" { second = Second }
        decl Second: "t" { v = 1 }
        "#,
    )])?;
    engine.load()?;
    assert_eq!(
        get_dependencies(&engine.registry().get("First").unwrap()),
        ["Second".to_string()].into_iter().collect()
    );
    Ok(())
}

#[test]
fn parallel_load_matches_sequential() -> Result<()> {
    let units = [
        ("base.cw", r#"decl Base: "t" { v = 1 }"#),
        ("l1.cw", r#"decl L1: "t" { b = Base }"#),
        ("l2.cw", r#"decl L2: "t" { b = Base }"#),
        ("l3.cw", r#"decl L3: "t" { b = Base }"#),
        ("top.cw", r#"decl Top: "t" { ls = [L1, L2, L3] }"#),
    ];

    let mut sequential = engine(&units)?;
    sequential.load()?;

    let mut parallel = engine(&units)?;
    parallel.load_parallel()?;

    // same contents; registration order across a wave's workers may differ
    let mut seq_ids = identifiers(&sequential.declarations());
    let mut par_ids = identifiers(&parallel.declarations());
    seq_ids.sort();
    par_ids.sort();
    assert_eq!(seq_ids, par_ids);

    for id in &seq_ids {
        let s = sequential.registry().get(id).unwrap();
        let p = parallel.registry().get(id).unwrap();
        assert_eq!(s.fields(), p.fields());
        assert_eq!(s.declaring_unit(), p.declaring_unit());
    }
    Ok(())
}

#[test]
fn emit_groups_serialize_for_the_serializer() -> Result<()> {
    let mut engine = engine(&[
        ("a.cw", r#"decl X: "t" { peer = Y }"#),
        ("b.cw", r#"decl Y: "t" { peer = X }
                    decl Z: "t" { x = X }"#),
    ])?;
    engine.load()?;
    let (groups, _) = engine.emit_order()?;
    let json = serde_json::to_string(&groups).unwrap();
    assert_eq!(json, r#"[{"cycle":["X","Y"]},{"single":"Z"}]"#);
    Ok(())
}
