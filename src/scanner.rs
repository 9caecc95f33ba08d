// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Decl, Expr, Unit};
use crate::schema::{is_identifier, SchemaHints};
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

/// One textual name use, with enough detail to cite in a validation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameUse {
    pub decl: String,
    pub field: String,
    pub name: String,
}

/// The result of statically scanning one unit: which top-level names it
/// declares and, per declared name, which other names it textually uses.
/// Produced without executing the unit body.
#[derive(Debug, Clone)]
pub struct UnitScan {
    pub path: Rc<str>,
    pub declared: BTreeSet<String>,
    /// Declared names in source order, duplicates preserved.
    pub decl_order: Vec<String>,
    pub uses: BTreeMap<String, BTreeSet<String>>,
    pub name_uses: Vec<NameUse>,
}

impl UnitScan {
    /// Every name this unit uses, declared locally or not.
    pub fn all_uses(&self) -> BTreeSet<String> {
        self.uses.values().flatten().cloned().collect()
    }

    /// Names referenced but not declared in this unit. These must be
    /// declared by some other unit in the set; whether they are is decided
    /// by graph validation, not here.
    pub fn external_names_used(&self) -> BTreeSet<String> {
        self.all_uses()
            .into_iter()
            .filter(|name| !self.declared.contains(name))
            .collect()
    }
}

/// Statically scan a unit's parse tree.
///
/// Four syntactic reference shapes are recognized: a bare name assigned to a
/// field, an attribute access rooted at a name, list literals whose elements
/// are names, and map literals whose values are names. Fields that are plain
/// literals contribute nothing — unless the schema hints mark the field
/// reference-shaped and its string value looks like an identifier.
///
/// A name used here but declared in no unit at all is not this pass's error;
/// it may live in a unit that has not been scanned yet.
pub fn scan_unit(unit: &Unit, hints: &SchemaHints) -> UnitScan {
    let mut declared = BTreeSet::new();
    let mut decl_order = vec![];
    let mut uses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut name_uses = vec![];

    for decl in &unit.decls {
        let decl_name = decl.name.text().to_string();
        declared.insert(decl_name.clone());
        decl_order.push(decl_name.clone());
        let field_uses = scan_decl(decl, hints);
        let entry = uses.entry(decl_name.clone()).or_default();
        for (field, names) in field_uses {
            for name in names {
                entry.insert(name.clone());
                name_uses.push(NameUse {
                    decl: decl_name.clone(),
                    field: field.clone(),
                    name,
                });
            }
        }
    }

    debug!(
        "scanned {}: declares {:?}, uses {:?}",
        unit.path(),
        declared,
        uses
    );

    UnitScan {
        path: unit.path().into(),
        declared,
        decl_order,
        uses,
        name_uses,
    }
}

fn scan_decl(decl: &Decl, hints: &SchemaHints) -> Vec<(String, BTreeSet<String>)> {
    let tag = decl.domain_tag.text();
    let mut fields = vec![];
    for field in &decl.fields {
        let mut names = BTreeSet::new();
        collect_names(&field.value, tag, field.name.text(), hints, &mut names);
        if !names.is_empty() {
            fields.push((field.name.text().to_string(), names));
        }
    }
    fields
}

fn collect_names(
    expr: &Expr,
    tag: &str,
    field: &str,
    hints: &SchemaHints,
    names: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Var { span } => {
            names.insert(span.text().to_string());
        }
        Expr::Attr { base, .. } => {
            names.insert(base.text().to_string());
        }
        Expr::Array { items, .. } => {
            for item in items {
                collect_names(item, tag, field, hints, names);
            }
        }
        Expr::Object { fields, .. } => {
            for (_, value) in fields {
                collect_names(value, tag, field, hints, names);
            }
        }
        Expr::String { value, .. } => {
            // A scalar-looking value that the schema declares reference-shaped.
            if hints.is_reference(tag, field) {
                if let Ok(s) = value.as_string() {
                    if is_identifier(s) {
                        names.insert(s.to_string());
                    }
                }
            }
        }
        // Context references resolve out-of-graph; literals contribute nothing.
        Expr::CtxRef { .. } | Expr::Number { .. } | Expr::Bool { .. } | Expr::Null { .. } => {}
    }
}
