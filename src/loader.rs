// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Field, Unit};
use crate::decl::{Declaration, FieldValue};
use crate::lexer::Span;
use crate::refs::Reference;
use crate::registry::Registry;
use crate::schema::{is_identifier, SchemaHints};
use crate::scheduler::LoadStep;
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use log::info;

/// The symbols visible to a unit body while it executes: every declaration
/// name known to the build (resolved declarations from prior steps, plus —
/// inside a merged cyclic step — cluster members that have not executed
/// yet), and the opaque framework symbols the host supplied at startup.
///
/// A name use never needs the target declaration's value at load time: it
/// produces a typed [`Reference`] that carries the identifier until emit
/// time. That deferral is what lets forward references inside a unit, and
/// cyclic unit clusters merged into one step, load at all.
///
/// Declarations shadow framework symbols.
struct Namespace<'a> {
    declaring: &'a BTreeMap<String, Rc<str>>,
    framework: &'a BTreeMap<String, Value>,
}

enum Binding<'a> {
    Decl(&'a str),
    Symbol(Value),
}

impl Namespace<'_> {
    fn lookup(&self, name: &str) -> Option<Binding<'_>> {
        if let Some((declared, _)) = self.declaring.get_key_value(name) {
            return Some(Binding::Decl(declared));
        }
        self.framework
            .get(name)
            .map(|value| Binding::Symbol(value.clone()))
    }
}

/// Executes unit bodies in the scheduled order, injecting resolved symbols
/// into each unit's namespace first, and passes every declaration a body
/// produces to [`Registry::register`].
///
/// Units execute exactly once, in a single pass; there is no retry. A unit
/// whose body fails registers nothing itself, but registrations made by
/// units that executed earlier in the same failed load are not rolled back
/// — the load aborts, so that partial state is never observed by a
/// successful build.
pub(crate) struct Loader<'a> {
    pub registry: &'a Registry,
    pub hints: &'a SchemaHints,
    pub declaring: &'a BTreeMap<String, Rc<str>>,
    pub framework: &'a BTreeMap<String, Value>,
}

impl Loader<'_> {
    /// Execute the steps sequentially, in exactly the scheduled order.
    pub fn run(&self, steps: &[LoadStep], units: &BTreeMap<Rc<str>, Rc<Unit>>) -> Result<()> {
        for step in steps {
            self.run_step(step, units)?;
        }
        Ok(())
    }

    /// Execute the steps wave by wave: all steps of equal depth share no
    /// ancestor/descendant relationship, so each wave runs its steps on
    /// scoped worker threads. Registration stays serialized inside the
    /// registry; the resulting registry contents equal a sequential run's.
    #[cfg(feature = "arc")]
    pub fn run_parallel(
        &self,
        steps: &[LoadStep],
        units: &BTreeMap<Rc<str>, Rc<Unit>>,
    ) -> Result<()> {
        let max_depth = match steps.iter().map(|s| s.depth).max() {
            Some(d) => d,
            None => return Ok(()),
        };

        for depth in 0..=max_depth {
            let wave: Vec<&LoadStep> = steps.iter().filter(|s| s.depth == depth).collect();
            if wave.len() == 1 {
                self.run_step(wave[0], units)?;
                continue;
            }
            std::thread::scope(|scope| {
                let handles: Vec<_> = wave
                    .iter()
                    .map(|&step| scope.spawn(move || self.run_step(step, units)))
                    .collect();
                let mut first_err = None;
                for handle in handles {
                    match handle.join() {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                        Err(_) => {
                            if first_err.is_none() {
                                first_err = Some(anyhow!("loader worker panicked"));
                            }
                        }
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            })?;
        }
        Ok(())
    }

    fn run_step(&self, step: &LoadStep, units: &BTreeMap<Rc<str>, Rc<Unit>>) -> Result<()> {
        if step.is_merged_cycle() {
            info!("loading cyclic unit cluster as one step: {:?}", step.units);
        }
        for path in &step.units {
            let unit = match units.get(path) {
                Some(u) => u.clone(),
                None => bail!("internal error: no unit for scheduled path {path}"),
            };
            info!("loading unit {path}");
            self.execute_unit(&unit, step)
                .map_err(|e| anyhow!("failed to load unit {path}: {e}"))?;
        }
        Ok(())
    }

    /// Evaluate the whole unit body first, then register. A body that fails
    /// mid-evaluation registers nothing; registrations made by earlier units
    /// of the same failed load are retained (see [`Loader`]).
    fn execute_unit(&self, unit: &Unit, step: &LoadStep) -> Result<()> {
        let namespace = Namespace {
            declaring: self.declaring,
            framework: self.framework,
        };

        let mut produced = vec![];
        for decl in &unit.decls {
            let tag = decl.domain_tag.text();
            let mut fields = IndexMap::new();
            for field in &decl.fields {
                let name = field.name.text();
                if fields.contains_key(name) {
                    return Err(field.name.error(&format!("duplicate field `{name}`")));
                }
                let value = self.eval_field(&namespace, tag, field, step)?;
                fields.insert(name.to_string(), value);
            }
            let span = decl.name.clone();
            produced.push((span, Declaration::new(decl.name.text(), tag, unit.path(), fields)));
        }

        for (span, declaration) in produced {
            self.registry
                .register(declaration)
                .map_err(|e| span.error(&format!("{e}")))?;
        }
        Ok(())
    }

    fn eval_field(
        &self,
        namespace: &Namespace,
        tag: &str,
        field: &Field,
        step: &LoadStep,
    ) -> Result<FieldValue> {
        let hinted = self.hints.is_reference(tag, field.name.text());
        self.eval_expr(namespace, &field.value, hinted, step)
    }

    fn eval_expr(
        &self,
        namespace: &Namespace,
        expr: &Expr,
        hinted: bool,
        step: &LoadStep,
    ) -> Result<FieldValue> {
        match expr {
            Expr::Null { .. } => Ok(FieldValue::Literal(Value::Null)),
            Expr::Bool { value, .. } | Expr::Number { value, .. } => {
                Ok(FieldValue::Literal(value.clone()))
            }
            Expr::String { span, value } => {
                // A scalar that the schema declares reference-shaped resolves
                // like a bare name, if it looks like one.
                if hinted {
                    if let Ok(s) = value.as_string() {
                        if is_identifier(s) {
                            return self.resolve_name(namespace, span, s, step);
                        }
                    }
                }
                Ok(FieldValue::Literal(value.clone()))
            }
            Expr::Var { span } => self.resolve_name(namespace, span, span.text(), step),
            Expr::Attr { base, attr, .. } => match namespace.lookup(base.text()) {
                Some(Binding::Decl(target)) => Ok(FieldValue::Ref(Reference::Attribute {
                    target: target.to_string(),
                    attr: attr.text().to_string(),
                })),
                Some(Binding::Symbol(_)) => Err(base.error(
                    "attribute access is only valid on declarations, not framework symbols",
                )),
                None => Err(self.undefined(base, base.text(), step)),
            },
            Expr::Array { span, items } => {
                let mut values = vec![];
                let mut targets = vec![];
                for item in items {
                    match self.eval_expr(namespace, item, hinted, step)? {
                        FieldValue::Literal(v) => values.push(v),
                        FieldValue::Ref(Reference::Direct { target }) => targets.push(target),
                        FieldValue::Ref(_) => {
                            return Err(item
                                .span()
                                .error("list elements may only be names or literals"))
                        }
                    }
                }
                match (values.is_empty(), targets.is_empty()) {
                    (_, true) => Ok(FieldValue::Literal(Value::from(values))),
                    (true, false) => Ok(FieldValue::Ref(Reference::List { targets })),
                    (false, false) => Err(span.error("list mixes references and literals")),
                }
            }
            Expr::Object { span, fields } => {
                let mut values = IndexMap::new();
                let mut entries = IndexMap::new();
                for (key, value) in fields {
                    let key_text = key.text().to_string();
                    match self.eval_expr(namespace, value, hinted, step)? {
                        FieldValue::Literal(v) => {
                            values.insert(key_text, v);
                        }
                        FieldValue::Ref(Reference::Direct { target }) => {
                            entries.insert(key_text, target);
                        }
                        FieldValue::Ref(_) => {
                            return Err(value
                                .span()
                                .error("map values may only be names or literals"))
                        }
                    }
                }
                match (values.is_empty(), entries.is_empty()) {
                    (_, true) => Ok(FieldValue::Literal(Value::from(values))),
                    (true, false) => Ok(FieldValue::Ref(Reference::Dict { entries })),
                    (false, false) => Err(span.error("map mixes references and literals")),
                }
            }
            Expr::CtxRef { key, .. } => Ok(FieldValue::Ref(Reference::Context {
                key: key.text().to_string(),
            })),
        }
    }

    fn resolve_name(
        &self,
        namespace: &Namespace,
        span: &Span,
        name: &str,
        step: &LoadStep,
    ) -> Result<FieldValue> {
        match namespace.lookup(name) {
            Some(Binding::Decl(target)) => Ok(FieldValue::Ref(Reference::Direct {
                target: target.to_string(),
            })),
            Some(Binding::Symbol(value)) => Ok(FieldValue::Literal(value)),
            None => Err(self.undefined(span, name, step)),
        }
    }

    /// Validation guarantees every used name is declared somewhere or is a
    /// framework symbol, so this only fires on unvalidated input. For a
    /// merged cyclic cluster the message names the cluster, since that is
    /// the unbreakable-cycle case.
    fn undefined(&self, span: &Span, name: &str, step: &LoadStep) -> anyhow::Error {
        if step.is_merged_cycle() {
            span.error(&format!(
                "unit cycle {:?} cannot be loaded as a single step: `{name}` is not \
                 defined within the cluster",
                step.units
            ))
        } else {
            span.error(&format!("`{name}` is not defined"))
        }
    }
}
