// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::refs::Reference;
use crate::value::Value;
use crate::Rc;

use indexmap::IndexMap;
use serde::Serialize;

/// The value of one declaration field: either a plain literal or a
/// structured, still-unresolved reference. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Literal(Value),
    Ref(Reference),
}

impl FieldValue {
    pub fn as_ref(&self) -> Option<&Reference> {
        match self {
            FieldValue::Ref(r) => Some(r),
            FieldValue::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            FieldValue::Literal(v) => Some(v),
            FieldValue::Ref(_) => None,
        }
    }
}

/// A named, typed unit of configuration produced by executing a declaration
/// body. Immutable once registered; the registry hands out shared pointers.
///
/// `declaring_unit` is the path of the unit that defined the declaration — a
/// back-reference by key, not an owning pointer.
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    identifier: Rc<str>,
    domain_tag: Rc<str>,
    fields: IndexMap<String, FieldValue>,
    declaring_unit: Rc<str>,
}

impl Declaration {
    pub fn new(
        identifier: impl Into<Rc<str>>,
        domain_tag: impl Into<Rc<str>>,
        declaring_unit: impl Into<Rc<str>>,
        fields: IndexMap<String, FieldValue>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            domain_tag: domain_tag.into(),
            fields,
            declaring_unit: declaring_unit.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn domain_tag(&self) -> &str {
        &self.domain_tag
    }

    pub fn declaring_unit(&self) -> &str {
        &self.declaring_unit
    }

    /// Fields in source order.
    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
