// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::graph::{Component, DependencyGraph};
use crate::refs::get_refs;
use crate::registry::Registry;
use crate::scanner::UnitScan;
use crate::validation::ValidationError;
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;

/// One step of the unit load order. A step usually holds one unit; a cyclic
/// cluster of units is merged into a single step, members in discovery
/// order, and loads atomically (best effort — see [`crate::Engine::load`]).
///
/// Steps with equal `depth` share no ancestor/descendant relationship and
/// may execute concurrently; steps must otherwise execute in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStep {
    pub units: Vec<Rc<str>>,
    pub depth: usize,
}

impl LoadStep {
    pub fn is_merged_cycle(&self) -> bool {
        self.units.len() > 1
    }
}

/// Compute the unit-level load order from the scanned unit set.
///
/// `declaring` maps every declared name to its declaring unit (the output of
/// unit validation). Names absent from the map were already reported as
/// unresolved and are skipped here.
pub fn schedule_units(
    scans: &[UnitScan],
    declaring: &BTreeMap<String, Rc<str>>,
) -> Result<Vec<LoadStep>> {
    let mut graph = DependencyGraph::new();
    for scan in scans {
        graph.add_node(scan.path.clone());
    }
    for scan in scans {
        for name in scan.all_uses() {
            if let Some(declaring_unit) = declaring.get(&name) {
                if declaring_unit != &scan.path {
                    graph.add_edge(&scan.path, declaring_unit)?;
                }
            }
        }
    }

    let mut steps: Vec<LoadStep> = vec![];
    let mut step_of: BTreeMap<Rc<str>, usize> = BTreeMap::new();
    for component in graph.order() {
        let units: Vec<Rc<str>> = component.members().iter().map(|m| Rc::from(*m)).collect();

        // Depth is one past the deepest step this one depends on. Dependency
        // steps always precede this one in the order, so the lookup is total.
        let step_idx = steps.len();
        let mut depth = 0;
        for unit in &units {
            for dep in graph.dependencies_of(unit) {
                if let Some(dep_step) = step_of.get(dep) {
                    if *dep_step != step_idx {
                        depth = depth.max(steps[*dep_step].depth + 1);
                    }
                }
            }
        }
        for unit in &units {
            step_of.insert(unit.clone(), step_idx);
        }
        steps.push(LoadStep { units, depth });
    }

    debug!("unit load order: {steps:?}");
    Ok(steps)
}

/// One group of the declaration-level emit order handed to the serializer.
/// A `Cycle` group collapses a strongly connected component; its members are
/// sorted by identifier so downstream consumers see a stable total order
/// even for mutual recursion they cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitGroup {
    Single(String),
    Cycle(Vec<String>),
}

impl EmitGroup {
    pub fn members(&self) -> Vec<&str> {
        match self {
            EmitGroup::Single(id) => vec![id.as_str()],
            EmitGroup::Cycle(ids) => ids.iter().map(|id| id.as_str()).collect(),
        }
    }
}

/// Compute the declaration-level emit order over the fully populated
/// registry. Declaration cycles are non-fatal: each is collapsed into one
/// group and surfaced as a `Cycle` warning in the returned batch. A
/// reference to an unregistered identifier is a validation error, not a
/// graph-construction error.
pub fn emit_schedule(registry: &Registry) -> Result<(Vec<EmitGroup>, Vec<ValidationError>)> {
    let mut graph = DependencyGraph::new();
    let mut errors = vec![];

    let declarations = registry.get_all(None);
    for decl in &declarations {
        graph.add_node(decl.identifier());
    }
    for decl in &declarations {
        for (field, reference) in get_refs(decl) {
            for target in reference.targets() {
                if graph.contains(target) {
                    graph.add_edge(decl.identifier(), target)?;
                } else {
                    errors.push(ValidationError::UnresolvedReference {
                        unit: decl.declaring_unit().to_string(),
                        decl: decl.identifier().to_string(),
                        field: field.to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }
    }

    let mut groups = vec![];
    for component in graph.order() {
        match component {
            Component::Single(id) => groups.push(EmitGroup::Single(id.to_string())),
            Component::Cycle(members) => {
                let mut members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                members.sort();
                warn!("declaration cycle collapsed into one emit group: {members:?}");
                errors.push(ValidationError::Cycle {
                    members: members.clone(),
                });
                groups.push(EmitGroup::Cycle(members));
            }
        }
    }

    Ok((groups, errors))
}
