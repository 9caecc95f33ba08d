// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{bail, Result};
use crosswire::unstable::{scan_unit, Parser, Source};
use crosswire::SchemaHints;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
struct Hint {
    tag: String,
    field: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    unit: String,
    #[serde(default)]
    hints: Vec<Hint>,
    declared: BTreeSet<String>,
    uses: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    external: Option<BTreeSet<String>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn run_case(case: &TestCase) -> Result<()> {
    let source = Source::from_contents("case.cw".to_string(), case.unit.clone())?;
    let unit = Parser::new(&source)?.parse()?;

    let mut hints = SchemaHints::new();
    for hint in &case.hints {
        hints.mark_reference(hint.tag.clone(), hint.field.clone());
    }

    let scan = scan_unit(&unit, &hints);
    if scan.declared != case.declared {
        bail!(
            "{}: declared mismatch: got {:?}, want {:?}",
            case.note,
            scan.declared,
            case.declared
        );
    }
    if scan.uses != case.uses {
        bail!(
            "{}: uses mismatch: got {:?}, want {:?}",
            case.note,
            scan.uses,
            case.uses
        );
    }
    if let Some(external) = &case.external {
        let got = scan.external_names_used();
        if &got != external {
            bail!(
                "{}: external mismatch: got {got:?}, want {external:?}",
                case.note
            );
        }
    }
    Ok(())
}

#[test]
fn yaml_cases() -> Result<()> {
    let mut total = 0;
    for entry in WalkDir::new("tests/scanner/cases").sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let yaml = std::fs::read_to_string(entry.path())?;
        let test: YamlTest = serde_yaml::from_str(&yaml)?;
        for case in &test.cases {
            println!("case: {}", case.note);
            run_case(case)?;
            total += 1;
        }
    }
    assert!(total > 0, "no scanner cases found");
    Ok(())
}
