// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::*;
use crate::value::Value;
use crate::Rc;

pub type Ref<T> = Rc<T>;

/// An expression on the right-hand side of a field assignment.
///
/// Bare identifiers, attribute accesses rooted at an identifier, bracket
/// literals of identifiers and brace literals with identifier values are the
/// syntactic reference shapes; `ctx("key")` is a context-value reference;
/// everything else is a literal.
#[derive(Debug)]
pub enum Expr {
    String {
        span: Span,
        value: Value,
    },

    Number {
        span: Span,
        value: Value,
    },

    Bool {
        span: Span,
        value: Value,
    },

    Null {
        span: Span,
    },

    /// A bare name use: `subnet = NetSubnet`.
    Var {
        span: Span,
    },

    /// An attribute access rooted at a name: `role = AppRole.arn`.
    Attr {
        span: Span,
        base: Span,
        attr: Span,
    },

    Array {
        span: Span,
        items: Vec<Ref<Expr>>,
    },

    /// Brace literal with string keys, in source order.
    Object {
        span: Span,
        fields: Vec<(Span, Ref<Expr>)>,
    },

    /// A context-value reference: `region = ctx("region")`.
    CtxRef {
        span: Span,
        key: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::String { span, .. }
            | Expr::Number { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Null { span }
            | Expr::Var { span }
            | Expr::Attr { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::CtxRef { span, .. } => span,
        }
    }
}

/// One `name = expr` field inside a declaration body.
#[derive(Debug)]
pub struct Field {
    pub span: Span,
    pub name: Span,
    pub value: Ref<Expr>,
}

/// A top-level declaration: `decl Name: "domain.tag" { fields }`.
#[derive(Debug)]
pub struct Decl {
    pub span: Span,
    pub name: Span,
    pub domain_tag: Span,
    pub fields: Vec<Field>,
}

/// The parse tree of one source unit.
#[derive(Debug)]
pub struct Unit {
    pub source: Source,
    pub decls: Vec<Decl>,
}

impl Unit {
    pub fn path(&self) -> &str {
        self.source.file()
    }
}
