//! Template tree nodes and value expressions.

use super::condition::ConditionExpr;
use crate::error::Result;
use crate::macros::MacroTemplate;

/// Right-hand side of an entry before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Literal string, never expanded.
    Str(String),
    /// Bare enumeration constant such as `RADIATION` or `ALL_CROPS`.
    Symbol(String),
    /// String built by macro interpolation (the `mkstr(...)` pattern).
    MkStr(MacroTemplate),
    /// Expanded value of a single macro.
    Macro(String),
    List(Vec<ValueExpr>),
    Object(Vec<(String, ValueExpr)>),
}

impl ValueExpr {
    pub fn str(value: impl Into<String>) -> Self {
        ValueExpr::Str(value.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        ValueExpr::Symbol(name.into())
    }

    pub fn mkstr(template: &str) -> Result<Self> {
        Ok(ValueExpr::MkStr(MacroTemplate::parse(template)?))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, ValueExpr)>) -> Self {
        ValueExpr::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An output product in the `{id, file: {fmt, name}}` shape.
    pub fn product(id: &str, fmt: &str, name_template: &str) -> Result<Self> {
        Ok(ValueExpr::object([
            ("id", ValueExpr::symbol(id)),
            (
                "file",
                ValueExpr::object([
                    ("fmt", ValueExpr::symbol(fmt)),
                    ("name", ValueExpr::mkstr(name_template)?),
                ]),
            ),
        ]))
    }
}

impl From<bool> for ValueExpr {
    fn from(value: bool) -> Self {
        ValueExpr::Bool(value)
    }
}

impl From<i64> for ValueExpr {
    fn from(value: i64) -> Self {
        ValueExpr::Int(value)
    }
}

impl From<f64> for ValueExpr {
    fn from(value: f64) -> Self {
        ValueExpr::Float(value)
    }
}

impl From<&str> for ValueExpr {
    fn from(value: &str) -> Self {
        ValueExpr::Str(value.to_string())
    }
}

/// One arm of an `if/elif` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub when: ConditionExpr,
    pub then: Vec<TemplateNode>,
}

impl Branch {
    pub fn new(when: ConditionExpr, then: Vec<TemplateNode>) -> Self {
        Self { when, then }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Entry {
        key: String,
        value: ValueExpr,
    },
    /// First branch whose condition holds is taken; `otherwise` when none does.
    Conditional {
        branches: Vec<Branch>,
        otherwise: Vec<TemplateNode>,
    },
    Include(String),
    Define {
        name: String,
        template: MacroTemplate,
    },
}

impl TemplateNode {
    pub fn entry(key: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        TemplateNode::Entry {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn include(fragment: impl Into<String>) -> Self {
        TemplateNode::Include(fragment.into())
    }

    pub fn define(name: impl Into<String>, template: &str) -> Result<Self> {
        Ok(TemplateNode::Define {
            name: name.into(),
            template: MacroTemplate::parse(template)?,
        })
    }

    /// `#ifdef`-style block without an else branch.
    pub fn when(condition: ConditionExpr, then: Vec<TemplateNode>) -> Self {
        TemplateNode::Conditional {
            branches: vec![Branch::new(condition, then)],
            otherwise: Vec::new(),
        }
    }

    pub fn if_else(
        condition: ConditionExpr,
        then: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    ) -> Self {
        TemplateNode::Conditional {
            branches: vec![Branch::new(condition, then)],
            otherwise,
        }
    }

    pub fn chain(branches: Vec<Branch>, otherwise: Vec<TemplateNode>) -> Self {
        TemplateNode::Conditional {
            branches,
            otherwise,
        }
    }

    /// Short label used in resolver locations.
    pub fn describe(&self) -> String {
        match self {
            TemplateNode::Entry { key, .. } => format!("entry '{}'", key),
            TemplateNode::Conditional { branches, .. } => match branches.first() {
                Some(first) => format!("if {}", first.when),
                None => "if".to_string(),
            },
            TemplateNode::Include(name) => format!("include '{}'", name),
            TemplateNode::Define { name, .. } => format!("define '{}'", name),
        }
    }
}
