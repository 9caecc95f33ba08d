// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Rc;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use anyhow::{bail, Result};

/// One strongly connected component of the graph, in final order.
///
/// `Cycle` members appear in discovery order (first node added to the graph
/// first). Single nodes with a self-loop are cycles too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Single(Rc<str>),
    Cycle(Vec<Rc<str>>),
}

impl Component {
    pub fn members(&self) -> Vec<&str> {
        match self {
            Component::Single(n) => vec![n.as_ref()],
            Component::Cycle(ns) => ns.iter().map(|n| n.as_ref()).collect(),
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Component::Cycle(_))
    }
}

/// Directed dependency graph keyed by string node id.
///
/// The same structure is used twice: once over unit paths and once over
/// declaration identifiers. An edge `a -> b` means "a depends on b". Node
/// insertion order is the discovery order and is the tie-break for every
/// ordering decision, so repeated runs on unchanged input produce identical
/// output.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Rc<str>>,
    index: BTreeMap<Rc<str>, usize>,
    edges: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if not present; returns its discovery index.
    pub fn add_node(&mut self, id: impl Into<Rc<str>>) -> usize {
        let id = id.into();
        if let Some(idx) = self.index.get(&id) {
            return *idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(id.clone());
        self.index.insert(id, idx);
        self.edges.push(BTreeSet::new());
        idx
    }

    /// Add edge `from -> to` ("from depends on to"). Both endpoints must
    /// already exist: a dangling edge is a validation failure upstream, not
    /// something the graph papers over.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let (from_idx, to_idx) = match (self.index.get(from), self.index.get(to)) {
            (Some(f), Some(t)) => (*f, *t),
            (None, _) => bail!("internal error: edge from unknown node `{from}`"),
            (_, None) => bail!("internal error: edge to unknown node `{to}`"),
        };
        self.edges[from_idx].insert(to_idx);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> &[Rc<str>] {
        &self.nodes
    }

    /// Direct dependencies of a node, in discovery order.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        match self.index.get(id) {
            Some(idx) => {
                let mut deps: Vec<usize> = self.edges[*idx].iter().cloned().collect();
                deps.sort_unstable();
                deps.iter().map(|i| self.nodes[*i].as_ref()).collect()
            }
            None => vec![],
        }
    }

    /// Strongly connected components via Tarjan's algorithm, iterative so
    /// deep graphs cannot overflow the call stack. Component order is
    /// unspecified here; `order()` makes it deterministic.
    fn sccs(&self) -> Vec<Vec<usize>> {
        const UNVISITED: usize = usize::MAX;

        let n = self.nodes.len();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = vec![];
        let mut next_index = 0usize;
        let mut components = vec![];

        for start in 0..n {
            if index[start] != UNVISITED {
                continue;
            }

            // Explicit DFS frames: (node, position into its edge list).
            let mut frames: Vec<(usize, Vec<usize>, usize)> = vec![];
            index[start] = next_index;
            lowlink[start] = next_index;
            next_index += 1;
            stack.push(start);
            on_stack[start] = true;
            frames.push((start, self.edges[start].iter().cloned().collect(), 0));

            while let Some(frame) = frames.last_mut() {
                let (v, succs, pos) = (frame.0, &frame.1, &mut frame.2);
                if *pos < succs.len() {
                    let w = succs[*pos];
                    *pos += 1;
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push((w, self.edges[w].iter().cloned().collect(), 0));
                    } else if on_stack[w] && index[w] < lowlink[v] {
                        lowlink[v] = index[w];
                    }
                } else {
                    frames.pop();
                    if let Some(parent) = frames.last() {
                        let p = parent.0;
                        if lowlink[v] < lowlink[p] {
                            lowlink[p] = lowlink[v];
                        }
                    }
                    if lowlink[v] == index[v] {
                        let mut component = vec![];
                        loop {
                            let w = match stack.pop() {
                                Some(w) => w,
                                None => break,
                            };
                            on_stack[w] = false;
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        components.push(component);
                    }
                }
            }
        }

        components
    }

    /// Deterministic linear order over the condensed graph: every component
    /// appears strictly after the components it depends on; ties between
    /// ready candidates are broken by discovery order (first seen, first
    /// emitted). Kahn's algorithm over the SCC condensation, so cycles never
    /// wedge the sort.
    pub fn order(&self) -> Vec<Component> {
        let sccs = self.sccs();
        let n_comps = sccs.len();

        let mut comp_of = vec![0usize; self.nodes.len()];
        for (cidx, members) in sccs.iter().enumerate() {
            for m in members {
                comp_of[*m] = cidx;
            }
        }

        // The tie-break key of a component is its earliest-discovered member.
        let mut comp_key = vec![usize::MAX; n_comps];
        for (cidx, members) in sccs.iter().enumerate() {
            for m in members {
                if *m < comp_key[cidx] {
                    comp_key[cidx] = *m;
                }
            }
        }

        // Condensed edges point dependency -> dependent so that in-degree
        // counts unsatisfied dependencies.
        let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n_comps];
        let mut in_degree = vec![0usize; n_comps];
        let mut self_loop = vec![false; n_comps];
        for (v, succs) in self.edges.iter().enumerate() {
            for w in succs {
                let (cv, cw) = (comp_of[v], comp_of[*w]);
                if cv == cw {
                    if v == *w {
                        self_loop[cv] = true;
                    }
                    continue;
                }
                if dependents[cw].insert(cv) {
                    in_degree[cv] += 1;
                }
            }
        }

        let mut ready = BinaryHeap::new();
        for cidx in 0..n_comps {
            if in_degree[cidx] == 0 {
                ready.push(Reverse((comp_key[cidx], cidx)));
            }
        }

        let mut order = vec![];
        while let Some(Reverse((_, cidx))) = ready.pop() {
            let mut members = sccs[cidx].clone();
            members.sort_unstable();
            if members.len() > 1 || self_loop[cidx] {
                order.push(Component::Cycle(
                    members.iter().map(|m| self.nodes[*m].clone()).collect(),
                ));
            } else {
                order.push(Component::Single(self.nodes[members[0]].clone()));
            }

            for dependent in dependents[cidx].clone() {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse((comp_key[dependent], dependent)));
                }
            }
        }

        order
    }
}
