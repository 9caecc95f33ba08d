// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Unit;
use crate::context::Context;
use crate::decl::Declaration;
use crate::lexer::Source;
use crate::loader::Loader;
use crate::parser::Parser;
use crate::registry::Registry;
use crate::scanner::{scan_unit, UnitScan};
use crate::schema::SchemaHints;
use crate::scheduler::{emit_schedule, schedule_units, EmitGroup, LoadStep};
use crate::validation::{validate_units, ValidationError};
use crate::value::Value;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};
use std::convert::AsRef;
use std::path::Path;

use anyhow::{bail, Result};
use log::debug;

struct UnitInfo {
    ast: Rc<Unit>,
    scan: UnitScan,
    executed: bool,
}

/// The build engine: collects units, validates the reference graph, loads
/// unit bodies in dependency order and hands the emit order to the
/// serializer collaborator.
///
/// ```no_run
/// # use crosswire::Engine;
/// # fn demo() -> anyhow::Result<()> {
/// let mut engine = Engine::new();
/// engine.add_unit_from_file("config/net.cw")?;
/// engine.add_unit_from_file("config/app.cw")?;
/// engine.load()?;
/// let (order, warnings) = engine.emit_order()?;
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    units: Vec<UnitInfo>,
    registry: Registry,
    context: Context,
    hints: SchemaHints,
    framework: BTreeMap<String, Value>,
    scope: Option<String>,
    loaded: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            units: vec![],
            registry: Registry::new(),
            context: Context::new(),
            hints: SchemaHints::new(),
            framework: BTreeMap::new(),
            scope: None,
            loaded: false,
        }
    }

    /// Add a unit from in-memory text. The unit is parsed and statically
    /// scanned now; its body does not execute until [`Engine::load`].
    pub fn add_unit(&mut self, path: String, text: String) -> Result<()> {
        if self.loaded {
            bail!("cannot add unit {path}: units have already been loaded");
        }
        if self.units.iter().any(|u| u.scan.path.as_ref() == path) {
            bail!("unit {path} has already been added");
        }
        let source = Source::from_contents(path, text)?;
        let mut parser = Parser::new(&source)?;
        let ast = Rc::new(parser.parse()?);
        let scan = scan_unit(&ast, &self.hints);
        self.units.push(UnitInfo {
            ast,
            scan,
            executed: false,
        });
        Ok(())
    }

    pub fn add_unit_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let source = Source::from_file(&path)?;
        self.add_unit(source.file().clone(), source.contents().clone())
    }

    /// Discover `.cw` units under a directory, in sorted path order so that
    /// discovery order does not depend on filesystem iteration order.
    pub fn add_units_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let mut paths = vec![];
        collect_unit_paths(dir.as_ref(), &mut paths)?;
        paths.sort();
        let count = paths.len();
        for path in paths {
            self.add_unit_from_file(path)?;
        }
        Ok(count)
    }

    /// Schema hints from the codegen collaborator. Units already added are
    /// re-scanned, since hints change which scalar fields count as uses.
    pub fn set_schema_hints(&mut self, hints: SchemaHints) -> Result<()> {
        if self.loaded {
            bail!("cannot change schema hints: units have already been loaded");
        }
        self.hints = hints;
        for info in &mut self.units {
            info.scan = scan_unit(&info.ast, &self.hints);
        }
        Ok(())
    }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Inject an opaque host symbol into every unit's execution namespace.
    /// The engine never interprets these values.
    pub fn add_framework_symbol(&mut self, name: impl Into<String>, value: Value) {
        self.framework.insert(name.into(), value);
    }

    /// Scope prefix applied by [`Engine::declarations`].
    pub fn set_scope(&mut self, prefix: impl Into<String>) {
        self.scope = Some(prefix.into());
    }

    fn ambient_names(&self) -> BTreeSet<String> {
        self.framework.keys().cloned().collect()
    }

    fn run_validation(&self) -> (BTreeMap<String, Rc<str>>, Vec<ValidationError>) {
        let scans: Vec<UnitScan> = self.units.iter().map(|u| u.scan.clone()).collect();
        validate_units(&scans, &self.ambient_names())
    }

    /// Run static analysis over the whole unit set and report every problem
    /// found, as a batch. Nothing executes. An empty report means the set is
    /// loadable, except that cyclic unit clusters are still best-effort.
    pub fn validate(&self) -> Vec<ValidationError> {
        self.run_validation().1
    }

    /// The unit-level load order, including merged cyclic clusters.
    pub fn load_order(&self) -> Result<Vec<LoadStep>> {
        let scans: Vec<UnitScan> = self.units.iter().map(|u| u.scan.clone()).collect();
        let (declaring, _) = validate_units(&scans, &self.ambient_names());
        schedule_units(&scans, &declaring)
    }

    #[allow(clippy::type_complexity)]
    fn prepare(
        &self,
    ) -> Result<(
        Vec<LoadStep>,
        BTreeMap<Rc<str>, Rc<Unit>>,
        BTreeMap<String, Rc<str>>,
    )> {
        if self.loaded {
            bail!("units have already been loaded; loading is single-pass");
        }

        // All static errors are reported before any unit executes.
        let (declaring, errors) = self.run_validation();
        let fatal: Vec<&ValidationError> = errors.iter().filter(|e| e.is_fatal()).collect();
        if !fatal.is_empty() {
            let mut report = String::from("validation failed:");
            for error in &fatal {
                report.push_str(&format!("\n  {error}"));
            }
            bail!(report);
        }

        let scans: Vec<UnitScan> = self.units.iter().map(|u| u.scan.clone()).collect();
        let steps = schedule_units(&scans, &declaring)?;
        let mut units = BTreeMap::new();
        for info in &self.units {
            units.insert(info.scan.path.clone(), info.ast.clone());
        }
        Ok((steps, units, declaring))
    }

    fn mark_executed(&mut self) {
        for info in &mut self.units {
            info.executed = true;
        }
        self.loaded = true;
    }

    /// Validate, then execute every unit body once, in dependency order,
    /// registering the declarations they produce. Aborts before executing
    /// anything if static validation fails; aborts at the failing unit on an
    /// execution error (earlier registrations are retained but the load as a
    /// whole is failed).
    pub fn load(&mut self) -> Result<()> {
        let (steps, units, declaring) = self.prepare()?;
        let loader = Loader {
            registry: &self.registry,
            hints: &self.hints,
            declaring: &declaring,
            framework: &self.framework,
        };
        loader.run(&steps, &units)?;
        self.mark_executed();
        debug!(
            "loaded {} units, {} declarations",
            units.len(),
            self.registry.len()
        );
        Ok(())
    }

    /// Like [`Engine::load`], but steps of equal topological depth execute
    /// concurrently on scoped threads. Produces the same registry contents
    /// as a sequential load.
    #[cfg(feature = "arc")]
    pub fn load_parallel(&mut self) -> Result<()> {
        let (steps, units, declaring) = self.prepare()?;
        let loader = Loader {
            registry: &self.registry,
            hints: &self.hints,
            declaring: &declaring,
            framework: &self.framework,
        };
        loader.run_parallel(&steps, &units)?;
        self.mark_executed();
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Paths of units whose bodies have executed. Empty until a load
    /// completes: a failed validation executes nothing.
    pub fn executed_units(&self) -> Vec<Rc<str>> {
        self.units
            .iter()
            .filter(|u| u.executed)
            .map(|u| u.scan.path.clone())
            .collect()
    }

    /// Loaded declarations, registration-ordered, filtered by the engine
    /// scope if one is set.
    pub fn declarations(&self) -> Vec<Rc<Declaration>> {
        self.registry.get_all(self.scope.as_deref())
    }

    /// The declaration-level emit order for the serializer, with cycle
    /// warnings (and any dangling-reference errors) batched alongside.
    pub fn emit_order(&self) -> Result<(Vec<EmitGroup>, Vec<ValidationError>)> {
        emit_schedule(&self.registry)
    }

    /// Identifiers in creation order: every declaration strictly after the
    /// declarations it references, cycle groups flattened in identifier
    /// order.
    pub fn creation_order(&self) -> Result<Vec<String>> {
        let (groups, _) = self.emit_order()?;
        Ok(groups
            .iter()
            .flat_map(|g| g.members().into_iter().map(|m| m.to_string()))
            .collect())
    }

    /// Exact reverse of [`Engine::creation_order`]: dependents first.
    pub fn deletion_order(&self) -> Result<Vec<String>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }
}

fn collect_unit_paths(dir: &Path, paths: &mut Vec<std::path::PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_unit_paths(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "cw") {
            paths.push(path);
        }
    }
    Ok(())
}
