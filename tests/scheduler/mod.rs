// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use crosswire::Engine;

fn load_order(units: &[(&str, &str)]) -> Result<Vec<Vec<String>>> {
    let mut engine = Engine::new();
    for (path, text) in units {
        engine.add_unit(path.to_string(), text.to_string())?;
    }
    Ok(engine
        .load_order()?
        .iter()
        .map(|s| s.units.iter().map(|u| u.to_string()).collect())
        .collect())
}

#[test]
fn chain() -> Result<()> {
    let order = load_order(&[
        ("instance.cw", r#"decl I: "t" { sub = S }"#),
        ("subnet.cw", r#"decl S: "t" { vpc = V }"#),
        ("vpc.cw", r#"decl V: "t" { cidr = "10.0.0.0/16" }"#),
    ])?;
    assert_eq!(
        order,
        [vec!["vpc.cw"], vec!["subnet.cw"], vec!["instance.cw"]]
    );
    Ok(())
}

#[test]
fn unrelated_units_keep_discovery_order() -> Result<()> {
    let order = load_order(&[
        ("zebra.cw", r#"decl Z: "t" { v = 1 }"#),
        ("alpha.cw", r#"decl A: "t" { v = 2 }"#),
        ("mango.cw", r#"decl M: "t" { v = 3 }"#),
    ])?;
    assert_eq!(
        order,
        [vec!["zebra.cw"], vec!["alpha.cw"], vec!["mango.cw"]]
    );
    Ok(())
}

#[test]
fn diamond() -> Result<()> {
    let order = load_order(&[
        ("top.cw", r#"decl T: "t" { l = L r = R }"#),
        ("left.cw", r#"decl L: "t" { b = B }"#),
        ("right.cw", r#"decl R: "t" { b = B }"#),
        ("bottom.cw", r#"decl B: "t" { v = 1 }"#),
    ])?;
    let flat: Vec<&str> = order.iter().flatten().map(|s| s.as_str()).collect();
    let pos = |p: &str| flat.iter().position(|x| *x == p).unwrap();
    assert!(pos("bottom.cw") < pos("left.cw"));
    assert!(pos("bottom.cw") < pos("right.cw"));
    assert!(pos("left.cw") < pos("top.cw"));
    assert!(pos("right.cw") < pos("top.cw"));
    // equal in-degree candidates fall back to discovery order
    assert!(pos("left.cw") < pos("right.cw"));
    Ok(())
}

#[test]
fn three_unit_cycle_is_one_step() -> Result<()> {
    let order = load_order(&[
        ("a.cw", r#"decl A: "t" { b = B }"#),
        ("b.cw", r#"decl B: "t" { c = C }"#),
        ("c.cw", r#"decl C: "t" { a = A }"#),
    ])?;
    assert_eq!(order, [vec!["a.cw", "b.cw", "c.cw"]]);
    Ok(())
}

#[test]
fn cycle_with_downstream_consumer() -> Result<()> {
    let order = load_order(&[
        ("x.cw", r#"decl X: "t" { y = Y }"#),
        ("y.cw", r#"decl Y: "t" { x = X }"#),
        ("main.cw", r#"decl Main: "t" { x = X }"#),
    ])?;
    assert_eq!(order, [vec!["x.cw", "y.cw"], vec!["main.cw"]]);
    Ok(())
}

#[test]
fn several_declarations_per_unit_produce_one_edge_set() -> Result<()> {
    let order = load_order(&[
        (
            "app.cw",
            r#"
            decl Web: "t" { net = NetA }
            decl Api: "t" { net = NetB }
            "#,
        ),
        (
            "net.cw",
            r#"
            decl NetA: "t" { v = 1 }
            decl NetB: "t" { v = 2 }
            "#,
        ),
    ])?;
    assert_eq!(order, [vec!["net.cw"], vec!["app.cw"]]);
    Ok(())
}
