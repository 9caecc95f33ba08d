// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::decl::{Declaration, FieldValue};
use crate::registry::Registry;

use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;

/// A typed edge from a declaration field to a target declaration, left
/// unresolved until the registry is fully populated. The serializer
/// collaborator turns these into the target format's representation.
///
/// `Context` is not a graph edge: it resolves against the [`crate::Context`]
/// store at emit time, never against another declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    Direct {
        target: String,
    },
    Attribute {
        target: String,
        attr: String,
    },
    List {
        targets: Vec<String>,
    },
    /// Key → target, in source order.
    Dict {
        entries: IndexMap<String, String>,
    },
    Context {
        key: String,
    },
}

impl Reference {
    pub fn is_context(&self) -> bool {
        matches!(self, Reference::Context { .. })
    }

    /// Target identifiers of this reference; empty for context references.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Reference::Direct { target } => vec![target],
            Reference::Attribute { target, .. } => vec![target],
            Reference::List { targets } => targets.iter().map(|t| t.as_str()).collect(),
            Reference::Dict { entries } => entries.values().map(|t| t.as_str()).collect(),
            Reference::Context { .. } => vec![],
        }
    }
}

/// Per field, zero or one reference — a field either is or is not a
/// reference, never both. Field order follows the declaration.
pub fn get_refs(decl: &Declaration) -> IndexMap<&str, Reference> {
    let mut refs = IndexMap::new();
    for (name, value) in decl.fields() {
        if let FieldValue::Ref(r) = value {
            refs.insert(name.as_str(), r.clone());
        }
    }
    refs
}

/// Identifiers this declaration directly references. Context references are
/// resolved out-of-graph and never appear here, and neither does the
/// declaration's own identifier (a self-reference is not a dependency).
pub fn get_dependencies(decl: &Declaration) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for (_, value) in decl.fields() {
        if let FieldValue::Ref(r) = value {
            for target in r.targets() {
                if target != decl.identifier() {
                    deps.insert(target.to_string());
                }
            }
        }
    }
    deps
}

/// Identifiers reachable from this declaration through the registered
/// declaration graph. Breadth-first with a visited set, so cycles terminate;
/// the start declaration itself is never part of the result, even when it
/// participates in a cycle.
pub fn get_transitive_dependencies(decl: &Declaration, registry: &Registry) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    visited.insert(decl.identifier().to_string());

    let mut result = BTreeSet::new();
    let mut queue: VecDeque<String> = get_dependencies(decl).into_iter().collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(target) = registry.get(&id) {
            for dep in get_dependencies(&target) {
                queue.push_back(dep);
            }
        }
        result.insert(id);
    }

    result
}
