//! Condition expressions over flags and defined macros.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "defined" "(" IDENT ")" | "true" | "false"
//!          | IDENT ( ("==" | "!=") IDENT )?
//! ```

use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::macros::MacroTable;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionExpr {
    Always,
    Never,
    /// True when a flag of that name is active or a macro of that name is defined.
    Defined(String),
    /// True when the exclusive `group` has `variant` selected.
    Is { group: String, variant: String },
    Not(Box<ConditionExpr>),
    All(Vec<ConditionExpr>),
    Any(Vec<ConditionExpr>),
}

impl ConditionExpr {
    pub fn defined(name: impl Into<String>) -> Self {
        ConditionExpr::Defined(name.into())
    }

    pub fn is(group: impl Into<String>, variant: impl Into<String>) -> Self {
        ConditionExpr::Is {
            group: group.into(),
            variant: variant.into(),
        }
    }

    pub fn not(inner: ConditionExpr) -> Self {
        ConditionExpr::Not(Box::new(inner))
    }

    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.or()?;
        if let Some(token) = parser.tokens.get(parser.pos) {
            return Err(parser.error(format!("unexpected {}", token)));
        }
        Ok(expr)
    }

    /// Check every group test against the declared groups.
    ///
    /// Runs over the whole expression so a malformed test is reported even
    /// when short-circuiting would never reach it.
    pub fn check(&self, flags: &FlagSet) -> Result<()> {
        match self {
            ConditionExpr::Is { group, variant } => match flags.group(group) {
                None => Err(Error::malformed(
                    self,
                    format!("'{}' is not a declared exclusive group", group),
                )),
                Some(g) if !g.contains(variant) => Err(Error::malformed(
                    self,
                    format!("'{}' is not a member of group '{}'", variant, group),
                )),
                Some(_) => Ok(()),
            },
            ConditionExpr::Not(inner) => inner.check(flags),
            ConditionExpr::All(items) | ConditionExpr::Any(items) => {
                items.iter().try_for_each(|item| item.check(flags))
            }
            ConditionExpr::Always | ConditionExpr::Never | ConditionExpr::Defined(_) => Ok(()),
        }
    }

    pub fn evaluate(&self, flags: &FlagSet, macros: &MacroTable) -> Result<bool> {
        self.check(flags)?;
        Ok(self.eval(flags, macros))
    }

    fn eval(&self, flags: &FlagSet, macros: &MacroTable) -> bool {
        match self {
            ConditionExpr::Always => true,
            ConditionExpr::Never => false,
            ConditionExpr::Defined(name) => flags.is_active(name) || macros.is_defined(name),
            ConditionExpr::Is { group, variant } => flags.enum_value(group) == Some(variant.as_str()),
            ConditionExpr::Not(inner) => !inner.eval(flags, macros),
            ConditionExpr::All(items) => items.iter().all(|i| i.eval(flags, macros)),
            ConditionExpr::Any(items) => items.iter().any(|i| i.eval(flags, macros)),
        }
    }

    /// Collect flag and group names this expression tests.
    pub fn collect_names(&self, out: &mut BTreeSet<String>) {
        match self {
            ConditionExpr::Defined(name) => {
                out.insert(name.clone());
            }
            ConditionExpr::Is { group, .. } => {
                out.insert(group.clone());
            }
            ConditionExpr::Not(inner) => inner.collect_names(out),
            ConditionExpr::All(items) | ConditionExpr::Any(items) => {
                items.iter().for_each(|i| i.collect_names(out))
            }
            ConditionExpr::Always | ConditionExpr::Never => {}
        }
    }
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::Always => write!(f, "true"),
            ConditionExpr::Never => write!(f, "false"),
            ConditionExpr::Defined(name) => write!(f, "{}", name),
            ConditionExpr::Is { group, variant } => write!(f, "{} == {}", group, variant),
            ConditionExpr::Not(inner) => match inner.as_ref() {
                ConditionExpr::Defined(_) | ConditionExpr::Always | ConditionExpr::Never => {
                    write!(f, "!{}", inner)
                }
                _ => write!(f, "!({})", inner),
            },
            ConditionExpr::All(items) => write_joined(f, items, " && "),
            ConditionExpr::Any(items) => write_joined(f, items, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[ConditionExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match item {
            ConditionExpr::All(_) | ConditionExpr::Any(_) => write!(f, "({})", item)?,
            _ => write!(f, "{}", item)?,
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Not,
    And,
    Or,
    Eq,
    Ne,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Not => write!(f, "'!'"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Eq => write!(f, "'=='"),
            Token::Ne => write!(f, "'!='"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let syntax = |message: String| Error::syntax(format!("condition '{}'", source), message);

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '!' => {
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' | '|' | '=' => {
                if chars.next_if_eq(&c).is_none() {
                    return Err(syntax(format!("expected '{}{}'", c, c)));
                }
                tokens.push(match c {
                    '&' => Token::And,
                    '|' => Token::Or,
                    _ => Token::Eq,
                });
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(next) = chars.next_if(|n| n.is_ascii_alphanumeric() || *n == '_') {
                    ident.push(next);
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(syntax(format!("unexpected character '{}'", other))),
        }
    }
    if tokens.is_empty() {
        return Err(syntax("empty condition".to_string()));
    }
    Ok(tokens)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: String) -> Error {
        Error::syntax(format!("condition '{}'", self.source), message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            Some(other) => Err(self.error(format!("expected a name, found {}", other))),
            None => Err(self.error("expected a name, found end of input".to_string())),
        }
    }

    fn or(&mut self) -> Result<ConditionExpr> {
        let mut items = vec![self.and()?];
        while self.eat(&Token::Or) {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            ConditionExpr::Any(items)
        })
    }

    fn and(&mut self) -> Result<ConditionExpr> {
        let mut items = vec![self.unary()?];
        while self.eat(&Token::And) {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            ConditionExpr::All(items)
        })
    }

    fn unary(&mut self) -> Result<ConditionExpr> {
        if self.eat(&Token::Not) {
            return Ok(ConditionExpr::not(self.unary()?));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<ConditionExpr> {
        if self.eat(&Token::LParen) {
            let inner = self.or()?;
            if !self.eat(&Token::RParen) {
                return Err(self.error("expected ')'".to_string()));
            }
            return Ok(inner);
        }

        let name = self.ident()?;
        match name.as_str() {
            "true" => return Ok(ConditionExpr::Always),
            "false" => return Ok(ConditionExpr::Never),
            "defined" if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let inner = self.ident()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("expected ')' after defined(NAME".to_string()));
                }
                return Ok(ConditionExpr::Defined(inner));
            }
            _ => {}
        }

        if self.eat(&Token::Eq) {
            let variant = self.ident()?;
            return Ok(ConditionExpr::is(name, variant));
        }
        if self.eat(&Token::Ne) {
            let variant = self.ident()?;
            return Ok(ConditionExpr::not(ConditionExpr::is(name, variant)));
        }
        Ok(ConditionExpr::Defined(name))
    }
}
