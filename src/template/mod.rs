//! The configuration template tree.
//!
//! A [`Template`] is a root node sequence plus named fragments that `include`
//! nodes splice in. Templates are read-only once built and may be shared by
//! any number of concurrent resolutions.

pub mod condition;
pub mod loader;
mod node;

pub use condition::ConditionExpr;
pub use loader::TemplateDocument;
pub use node::{Branch, TemplateNode, ValueExpr};

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    name: String,
    root: Vec<TemplateNode>,
    fragments: BTreeMap<String, Vec<TemplateNode>>,
}

impl Template {
    pub fn new(name: impl Into<String>, root: Vec<TemplateNode>) -> Self {
        Self {
            name: name.into(),
            root,
            fragments: BTreeMap::new(),
        }
    }

    pub fn with_fragment(mut self, name: impl Into<String>, nodes: Vec<TemplateNode>) -> Self {
        self.add_fragment(name, nodes);
        self
    }

    pub fn add_fragment(&mut self, name: impl Into<String>, nodes: Vec<TemplateNode>) {
        self.fragments.insert(name.into(), nodes);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &[TemplateNode] {
        &self.root
    }

    pub fn fragment(&self, name: &str) -> Option<&[TemplateNode]> {
        self.fragments.get(name).map(Vec::as_slice)
    }

    pub fn has_fragment(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn fragment_names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// Every node sequence: the root first, then fragments by name.
    fn sequences(&self) -> impl Iterator<Item = &[TemplateNode]> {
        std::iter::once(self.root.as_slice()).chain(self.fragments.values().map(Vec::as_slice))
    }

    /// Flag and group names tested anywhere in the template, in any branch.
    pub fn referenced_flags(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for seq in self.sequences() {
            visit(seq, &mut |node| {
                if let TemplateNode::Conditional { branches, .. } = node {
                    for branch in branches {
                        branch.when.collect_names(&mut names);
                    }
                }
            });
        }
        names
    }

    /// Macro names defined anywhere in the template, in any branch.
    pub fn defined_macros(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for seq in self.sequences() {
            visit(seq, &mut |node| {
                if let TemplateNode::Define { name, .. } = node {
                    names.insert(name.clone());
                }
            });
        }
        names
    }

    /// Fragment names referenced by `include` nodes, in any branch.
    pub fn referenced_includes(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for seq in self.sequences() {
            visit(seq, &mut |node| {
                if let TemplateNode::Include(name) = node {
                    names.insert(name.clone());
                }
            });
        }
        names
    }
}

/// Pre-order walk over every node, descending into all branches.
fn visit(nodes: &[TemplateNode], f: &mut impl FnMut(&TemplateNode)) {
    for node in nodes {
        f(node);
        if let TemplateNode::Conditional {
            branches,
            otherwise,
        } = node
        {
            for branch in branches {
                visit(&branch.then, f);
            }
            visit(otherwise, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Template {
        Template::new(
            "sample",
            vec![
                TemplateNode::when(
                    ConditionExpr::defined("NOCO2"),
                    vec![TemplateNode::define("FROM_RESTART", "").unwrap()],
                ),
                TemplateNode::include("param"),
                TemplateNode::if_else(
                    ConditionExpr::parse("climate == CRU4").unwrap(),
                    vec![TemplateNode::entry("firstyear", 1901i64)],
                    vec![
                        TemplateNode::entry("firstyear", 1951i64),
                        TemplateNode::include("extra"),
                    ],
                ),
            ],
        )
        .with_fragment(
            "param",
            vec![TemplateNode::when(
                ConditionExpr::defined("CHECKPOINT"),
                vec![TemplateNode::entry("checkpoint_filename", "restart/ckpt.lpj")],
            )],
        )
    }

    #[test]
    fn test_referenced_flags_cover_fragments_and_branches() {
        let names = sample().referenced_flags();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["CHECKPOINT", "NOCO2", "climate"]
        );
    }

    #[test]
    fn test_referenced_includes_and_defines() {
        let template = sample();
        assert_eq!(
            template.referenced_includes().into_iter().collect::<Vec<_>>(),
            vec!["extra", "param"]
        );
        assert!(template.defined_macros().contains("FROM_RESTART"));
        assert!(template.has_fragment("param"));
        assert!(!template.has_fragment("extra"));
    }
}
