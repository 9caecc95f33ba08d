// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;
use crate::value::Value;

use anyhow::Result;

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
}

const KEYWORDS: [&str; 5] = ["decl", "ctx", "true", "false", "null"];

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String => "",
        }
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.source.error(self.tok.1.line, self.tok.1.col, &msg))
        }
    }

    fn parse_ident(&mut self, context: &str) -> Result<Span> {
        let span = self.tok.1.clone();
        if self.tok.0 != TokenKind::Ident {
            let msg = format!("expecting identifier {context}");
            return Err(self.source.error(span.line, span.col, &msg));
        }
        if KEYWORDS.contains(&span.text()) {
            let msg = format!("unexpected keyword `{}` {context}", span.text());
            return Err(self.source.error(span.line, span.col, &msg));
        }
        self.next_token()?;
        Ok(span)
    }

    fn parse_string(&mut self, context: &str) -> Result<Span> {
        let span = self.tok.1.clone();
        if self.tok.0 != TokenKind::String {
            let msg = format!("expecting string {context}");
            return Err(self.source.error(span.line, span.col, &msg));
        }
        self.next_token()?;
        Ok(span)
    }

    fn string_value(span: &Span) -> Result<Value> {
        // The span excludes the surrounding quotes; reconstruct them so that
        // escape sequences are decoded exactly as the lexer validated them.
        let quoted = format!("\"{}\"", span.text());
        match serde_json::from_str::<String>(&quoted) {
            Ok(s) => Ok(Value::from(s)),
            Err(e) => Err(span.error(&format!("invalid string. {e}"))),
        }
    }

    fn parse_array(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        self.expect("[", "while parsing list")?;
        let mut items = vec![];
        if self.token_text() != "]" {
            loop {
                items.push(Ref::new(self.parse_expr()?));
                if self.token_text() != "," {
                    break;
                }
                self.next_token()?;
                // allow trailing comma
                if self.token_text() == "]" {
                    break;
                }
            }
        }
        self.expect("]", "while parsing list")?;
        Ok(Expr::Array { span, items })
    }

    fn parse_object(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        self.expect("{", "while parsing map")?;
        let mut fields = vec![];
        if self.token_text() != "}" {
            loop {
                let key = self.parse_string("as map key")?;
                self.expect(":", "after map key")?;
                let value = Ref::new(self.parse_expr()?);
                fields.push((key, value));
                if self.token_text() != "," {
                    break;
                }
                self.next_token()?;
                if self.token_text() == "}" {
                    break;
                }
            }
        }
        self.expect("}", "while parsing map")?;
        Ok(Expr::Object { span, fields })
    }

    fn parse_ctx_ref(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        self.next_token()?; // ctx
        self.expect("(", "after `ctx`")?;
        let key = self.parse_string("as context key")?;
        self.expect(")", "after context key")?;
        Ok(Expr::CtxRef { span, key })
    }

    fn parse_var_or_attr(&mut self) -> Result<Expr> {
        let base = self.parse_ident("in expression")?;
        if self.token_text() != "." {
            return Ok(Expr::Var { span: base });
        }
        self.next_token()?;
        let attr = self.parse_ident("after `.`")?;
        let span = Span {
            source: base.source.clone(),
            line: base.line,
            col: base.col,
            start: base.start,
            end: attr.end,
        };
        if self.token_text() == "." {
            return Err(self
                .source
                .error(self.tok.1.line, self.tok.1.col, "chained attribute access"));
        }
        Ok(Expr::Attr { span, base, attr })
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        match &self.tok.0 {
            TokenKind::String => {
                let value = Self::string_value(&span)?;
                self.next_token()?;
                Ok(Expr::String { span, value })
            }
            TokenKind::Number => {
                let value = match serde_json::from_str(span.text()) {
                    Ok(n) => Value::Number(n),
                    Err(e) => return Err(span.error(&format!("invalid number. {e}"))),
                };
                self.next_token()?;
                Ok(Expr::Number { span, value })
            }
            TokenKind::Ident => match span.text() {
                "true" | "false" => {
                    let value = Value::Bool(span.text() == "true");
                    self.next_token()?;
                    Ok(Expr::Bool { span, value })
                }
                "null" => {
                    self.next_token()?;
                    Ok(Expr::Null { span })
                }
                "ctx" => self.parse_ctx_ref(),
                _ => self.parse_var_or_attr(),
            },
            TokenKind::Symbol if span.text() == "[" => self.parse_array(),
            TokenKind::Symbol if span.text() == "{" => self.parse_object(),
            _ => Err(self
                .source
                .error(span.line, span.col, "expecting expression")),
        }
    }

    fn parse_field(&mut self) -> Result<Field> {
        let span = self.tok.1.clone();
        let name = self.parse_ident("as field name")?;
        self.expect("=", "after field name")?;
        let value = Ref::new(self.parse_expr()?);
        Ok(Field { span, name, value })
    }

    fn parse_decl(&mut self) -> Result<Decl> {
        let span = self.tok.1.clone();
        self.expect("decl", "at start of declaration")?;
        let name = self.parse_ident("as declaration name")?;
        self.expect(":", "after declaration name")?;
        let domain_tag = self.parse_string("as domain tag")?;
        self.expect("{", "to begin declaration body")?;
        let mut fields = vec![];
        while self.token_text() != "}" {
            fields.push(self.parse_field()?);
        }
        self.expect("}", "to end declaration body")?;
        Ok(Decl {
            span,
            name,
            domain_tag,
            fields,
        })
    }

    pub fn parse(&mut self) -> Result<Unit> {
        let mut decls = vec![];
        while self.tok.0 != TokenKind::Eof {
            decls.push(self.parse_decl()?);
        }
        Ok(Unit {
            source: self.source.clone(),
            decls,
        })
    }
}
