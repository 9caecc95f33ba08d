// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::decl::Declaration;
use crate::Rc;

use std::collections::BTreeMap;

use parking_lot::Mutex;

type String = Rc<str>;

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two declarations registered the same identifier in the same scope.
    #[error("registration conflict: `{identifier}` is declared by both {first_unit} and {second_unit}")]
    Conflict {
        identifier: String,
        first_unit: String,
        second_unit: String,
    },
    /// Empty or whitespace-only identifiers are not allowed.
    #[error("registration failed: the identifier '{identifier}' is invalid")]
    InvalidIdentifier { identifier: String },
}

struct RegistryInner {
    by_id: BTreeMap<String, Rc<Declaration>>,
    // registration order, preserved by get_all
    order: Vec<String>,
}

/// Store of every declaration registered during a load.
///
/// Explicitly constructed and passed around — never a process-wide global;
/// tests instantiate a fresh store each. A single mutex guards the one
/// mutation path, which keeps concurrent `register` calls from independent
/// loader workers safe. Reads after the load phase completes take the same
/// lock but face no contention.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                by_id: BTreeMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Register a declaration. Registering an identifier that already exists
    /// is a conflict, never a silent overwrite — even if the two
    /// declarations are field-identical.
    pub fn register(&self, decl: Declaration) -> Result<Rc<Declaration>, RegistryError> {
        let identifier: String = decl.identifier().into();
        if identifier.is_empty() || identifier.trim().is_empty() {
            return Err(RegistryError::InvalidIdentifier { identifier });
        }

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.by_id.get(&identifier) {
            return Err(RegistryError::Conflict {
                first_unit: existing.declaring_unit().into(),
                second_unit: decl.declaring_unit().into(),
                identifier,
            });
        }
        let decl = Rc::new(decl);
        inner.by_id.insert(identifier.clone(), decl.clone());
        inner.order.push(identifier);
        Ok(decl)
    }

    /// Retrieve a declaration by identifier, if registered.
    pub fn get(&self, identifier: &str) -> Option<Rc<Declaration>> {
        self.inner.lock().by_id.get(identifier).cloned()
    }

    /// All declarations whose identifier starts with the scope prefix, in
    /// registration order. `None` returns everything.
    pub fn get_all(&self, scope_prefix: Option<&str>) -> Vec<Rc<Declaration>> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter(|id| match scope_prefix {
                Some(prefix) => id.starts_with(prefix),
                None => true,
            })
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    /// Declarations wrapping the given kind of thing, in registration order.
    pub fn get_by_tag(&self, domain_tag: &str) -> Vec<Rc<Declaration>> {
        self.get_all(None)
            .into_iter()
            .filter(|d| d.domain_tag() == domain_tag)
            .collect()
    }

    /// Registered identifiers in registration order.
    pub fn identifiers(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.inner.lock().by_id.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }

    /// Clear the registry. Supports host-process teardown between builds.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_id.clear();
        inner.order.clear();
    }
}
