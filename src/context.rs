// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::refs::Reference;
use crate::value::Value;

use std::collections::BTreeMap;

/// Environment-specific values resolved at emit time.
///
/// Context references (`region = ctx("region")`) are not graph edges; they
/// look up this store when the serializer collaborator renders the final
/// graph. The store is opaque to loading and ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Resolve a context reference to its value. Non-context references are
    /// resolved via the registry, not here.
    pub fn resolve(&self, reference: &Reference) -> Option<&Value> {
        match reference {
            Reference::Context { key } => self.get(key),
            _ => None,
        }
    }
}
