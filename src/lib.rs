// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! crosswire: a reference-graph resolver and dependency-ordered loader for
//! declarative configuration.
//!
//! A configuration graph is a set of named declarations spread across many
//! source units. Declarations reference one another by bare name; there are
//! no import directives and no required declaration order. The engine
//! statically scans each unit for the names it defines and uses, builds a
//! dependency graph over units and declarations, computes a deterministic
//! load order, and executes unit bodies with previously resolved symbols
//! injected into their namespace so forward references work.
//!
//! ```text
//! decl NetVpc: "net.vpc" {
//!     cidr = "10.0.0.0/16"
//! }
//!
//! decl AppServer: "compute.instance" {
//!     subnet = NetSubnet          # resolved before this unit executes
//!     region = ctx("region")      # resolved at emit time
//! }
//! ```

// `Rc` is std::sync::Arc under the (default) `arc` feature so that the
// registry and the parallel loader can be shared across threads.
#[cfg(feature = "arc")]
pub use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub use std::rc::Rc;

mod ast;
mod context;
mod decl;
mod engine;
mod graph;
mod lexer;
mod loader;
mod number;
mod parser;
mod refs;
mod registry;
mod scanner;
mod schema;
mod scheduler;
mod validation;
mod value;

pub use context::Context;
pub use decl::{Declaration, FieldValue};
pub use engine::Engine;
pub use graph::{Component, DependencyGraph};
pub use number::Number;
pub use refs::{get_dependencies, get_refs, get_transitive_dependencies, Reference};
pub use registry::{Registry, RegistryError};
pub use scanner::{NameUse, UnitScan};
pub use schema::SchemaHints;
pub use scheduler::{EmitGroup, LoadStep};
pub use validation::ValidationError;
pub use value::Value;

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::ast::*;
    pub use crate::lexer::*;
    pub use crate::parser::*;
    pub use crate::scanner::scan_unit;
}
