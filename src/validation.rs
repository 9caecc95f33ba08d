// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::scanner::UnitScan;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// A structured validation problem. Problems are collected and returned as a
/// batch so that one run surfaces all of them, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    /// A name is used but declared by no unit in the scanned set.
    #[error("unresolved reference: `{target}` used by `{decl}.{field}` in {unit} is declared nowhere")]
    UnresolvedReference {
        unit: String,
        decl: String,
        field: String,
        target: String,
    },

    /// Two declarations claim the same identifier in the same scope.
    #[error("duplicate identifier `{identifier}`: declared in {first_unit} and {second_unit}")]
    DuplicateIdentifier {
        identifier: String,
        first_unit: String,
        second_unit: String,
    },

    /// Mutually referencing declarations. Informational at the declaration
    /// level: the members are emitted as one collapsed group.
    #[error("declaration cycle: {}", .members.join(" -> "))]
    Cycle { members: Vec<String> },
}

impl ValidationError {
    /// Cycles at the declaration level are warnings; everything else aborts
    /// the load.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ValidationError::Cycle { .. })
    }
}

/// Map every declared name to its declaring unit and report all static
/// problems across the unit set: duplicate identifiers first, then names
/// that no unit declares. Nothing has executed when this runs.
///
/// `ambient` names (the host's framework symbols) resolve without being
/// declared by any unit; they contribute no graph edges and declarations
/// may shadow them.
pub fn validate_units(
    scans: &[UnitScan],
    ambient: &BTreeSet<String>,
) -> (BTreeMap<String, Rc<str>>, Vec<ValidationError>) {
    let mut declaring: BTreeMap<String, Rc<str>> = BTreeMap::new();
    let mut errors = vec![];

    for scan in scans {
        for name in &scan.decl_order {
            match declaring.get(name) {
                Some(first_unit) => errors.push(ValidationError::DuplicateIdentifier {
                    identifier: name.clone(),
                    first_unit: first_unit.to_string(),
                    second_unit: scan.path.to_string(),
                }),
                None => {
                    declaring.insert(name.clone(), scan.path.clone());
                }
            }
        }
    }

    for scan in scans {
        for name_use in &scan.name_uses {
            if !declaring.contains_key(&name_use.name) && !ambient.contains(&name_use.name) {
                errors.push(ValidationError::UnresolvedReference {
                    unit: scan.path.to_string(),
                    decl: name_use.decl.clone(),
                    field: name_use.field.clone(),
                    target: name_use.name.clone(),
                });
            }
        }
    }

    (declaring, errors)
}
