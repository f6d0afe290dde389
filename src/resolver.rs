//! Template resolution.
//!
//! Walks a [`Template`] depth first under one [`FlagSet`], selecting exactly
//! one branch of every conditional, splicing includes in place and expanding
//! macro references. The result is an unvalidated [`Candidate`].

use crate::config::ResolverSettings;
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::macros::MacroTable;
use crate::manifest::{Candidate, Override, ResolvedEntry, ResolvedValue};
use crate::template::{Template, TemplateNode, ValueExpr};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Macro whose value names the run's output directory.
pub const OUTPUT_DIR_MACRO: &str = "output";

pub struct Resolver<'a> {
    template: &'a Template,
    flags: &'a FlagSet,
    macros: Option<&'a MacroTable>,
    settings: ResolverSettings,
}

impl<'a> Resolver<'a> {
    pub fn new(template: &'a Template, flags: &'a FlagSet) -> Self {
        Self {
            template,
            flags,
            macros: None,
            settings: ResolverSettings::default(),
        }
    }

    /// Base definitions visible before the walk starts. Never mutated.
    pub fn with_macros(mut self, macros: &'a MacroTable) -> Self {
        self.macros = Some(macros);
        self
    }

    pub fn with_settings(mut self, settings: &ResolverSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn resolve(&self) -> Result<Candidate> {
        let mut macros = self.macros.cloned().unwrap_or_default();
        macros.set_max_depth(self.settings.max_expansion_depth);
        let mut walk = Walk {
            template: self.template,
            flags: self.flags,
            settings: &self.settings,
            macros,
            entries: Vec::new(),
            positions: BTreeMap::new(),
            writes: BTreeMap::new(),
            trail: vec!["root".to_string()],
            includes: Vec::new(),
        };
        walk.walk(self.template.root())?;

        let output_dir = if walk.macros.is_defined(OUTPUT_DIR_MACRO) {
            Some(
                walk.macros
                    .resolve(OUTPUT_DIR_MACRO)
                    .map_err(|e| e.at(&format!("macro '{}'", OUTPUT_DIR_MACRO)))?,
            )
        } else {
            None
        };

        let overrides = walk.overrides();
        debug!(
            template = self.template.name(),
            flags = %self.flags.label(),
            entries = walk.entries.len(),
            overrides = overrides.len(),
            "Resolved template"
        );
        Ok(Candidate::new(walk.entries, output_dir, overrides))
    }
}

/// Transient state of one resolution.
struct Walk<'a> {
    template: &'a Template,
    flags: &'a FlagSet,
    settings: &'a ResolverSettings,
    macros: MacroTable,
    entries: Vec<ResolvedEntry>,
    /// Key to index into `entries`.
    positions: BTreeMap<String, usize>,
    /// Locations of every write per key.
    writes: BTreeMap<String, Vec<String>>,
    trail: Vec<String>,
    /// Fragments currently being spliced, outermost first.
    includes: Vec<String>,
}

impl<'a> Walk<'a> {
    fn location(&self) -> String {
        self.trail.join(" > ")
    }

    fn walk(&mut self, nodes: &'a [TemplateNode]) -> Result<()> {
        for (index, node) in nodes.iter().enumerate() {
            self.trail.push(format!("#{} {}", index, node.describe()));
            let result = self.visit(node);
            self.trail.pop();
            result?;
        }
        Ok(())
    }

    fn visit(&mut self, node: &'a TemplateNode) -> Result<()> {
        match node {
            TemplateNode::Entry { key, value } => {
                let value = self.expand(value).map_err(|e| e.at(&self.location()))?;
                self.emit(key, value);
                Ok(())
            }
            TemplateNode::Conditional {
                branches,
                otherwise,
            } => {
                // Every arm is checked against the declared groups, taken or not
                for branch in branches {
                    branch
                        .when
                        .check(self.flags)
                        .map_err(|e| e.at(&self.location()))?;
                }

                let mut selected = None;
                for (index, branch) in branches.iter().enumerate() {
                    if branch
                        .when
                        .evaluate(self.flags, &self.macros)
                        .map_err(|e| e.at(&self.location()))?
                    {
                        selected = Some((format!("branch {}", index), branch.then.as_slice()));
                        break;
                    }
                }
                let (label, nodes) =
                    selected.unwrap_or_else(|| ("else".to_string(), otherwise.as_slice()));

                trace!(location = %self.location(), branch = %label, "Selected branch");
                self.trail.push(label);
                let result = self.walk(nodes);
                self.trail.pop();
                result
            }
            TemplateNode::Include(name) => {
                let limit = self.settings.max_include_depth;
                if self.includes.len() >= limit {
                    return Err(Error::IncludeDepthExceeded {
                        fragment: name.clone(),
                        limit,
                        location: self.location(),
                    });
                }
                let Some(nodes) = self.template.fragment(name) else {
                    return Err(Error::UnknownInclude {
                        fragment: name.clone(),
                        location: self.location(),
                    });
                };

                self.includes.push(name.clone());
                self.trail.push(format!("fragment '{}'", name));
                let result = self.walk(nodes);
                self.trail.pop();
                self.includes.pop();
                result
            }
            TemplateNode::Define { name, template } => {
                self.macros.define_template(name, template.clone());
                Ok(())
            }
        }
    }

    fn expand(&mut self, value: &ValueExpr) -> Result<ResolvedValue> {
        Ok(match value {
            ValueExpr::Bool(b) => ResolvedValue::Bool(*b),
            ValueExpr::Int(i) => ResolvedValue::Int(*i),
            ValueExpr::Float(f) => ResolvedValue::Float(*f),
            ValueExpr::Str(s) => ResolvedValue::Str(s.clone()),
            ValueExpr::Symbol(s) => ResolvedValue::Symbol(s.clone()),
            ValueExpr::MkStr(template) => ResolvedValue::Str(self.macros.expand(template)?),
            ValueExpr::Macro(name) => ResolvedValue::Str(self.macros.resolve(name)?),
            ValueExpr::List(items) => ResolvedValue::List(
                items
                    .iter()
                    .map(|item| self.expand(item))
                    .collect::<Result<_>>()?,
            ),
            ValueExpr::Object(fields) => ResolvedValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.expand(v)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Append or merge a top-level entry.
    fn emit(&mut self, key: &str, value: ResolvedValue) {
        let location = self.location();
        self.writes.entry(key.to_string()).or_default().push(location);

        let existing = self.positions.get(key).copied();
        if self.settings.is_repeatable(key) {
            let items = match value {
                ResolvedValue::List(items) => items,
                single => vec![single],
            };
            match existing {
                Some(index) => {
                    if let ResolvedValue::List(list) = &mut self.entries[index].value {
                        list.extend(items);
                    }
                }
                None => self.push(key, ResolvedValue::List(items)),
            }
            return;
        }

        match existing {
            Some(index) => {
                debug!(key, location = %self.location(), "Top-level key overridden");
                self.entries[index].value = value;
            }
            None => self.push(key, value),
        }
    }

    fn push(&mut self, key: &str, value: ResolvedValue) {
        self.positions.insert(key.to_string(), self.entries.len());
        self.entries.push(ResolvedEntry {
            key: key.to_string(),
            value,
        });
    }

    /// Non-repeatable keys written more than once, in document order.
    fn overrides(&self) -> Vec<Override> {
        self.entries
            .iter()
            .filter(|e| !self.settings.is_repeatable(&e.key))
            .filter_map(|e| {
                let locations = self.writes.get(&e.key)?;
                (locations.len() > 1).then(|| Override {
                    key: e.key.clone(),
                    locations: locations.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ExclusiveGroup;
    use crate::template::{Branch, ConditionExpr};

    fn climate() -> ExclusiveGroup {
        ExclusiveGroup::new("climate", ["CRU4", "HADGEM", "IPSL"])
    }

    fn flags(names: &[&str]) -> FlagSet {
        names
            .iter()
            .fold(FlagSet::builder().group(climate()), |b, n| b.flag(*n))
            .build()
            .unwrap()
    }

    fn cond(src: &str) -> ConditionExpr {
        ConditionExpr::parse(src).unwrap()
    }

    fn resolve(template: &Template, flags: &FlagSet) -> Result<Candidate> {
        Resolver::new(template, flags).resolve()
    }

    #[test]
    fn test_only_selected_branch_contributes() {
        let template = Template::new(
            "t",
            vec![TemplateNode::chain(
                vec![
                    Branch::new(cond("climate == CRU4"), vec![TemplateNode::entry("a", 1i64)]),
                    Branch::new(cond("climate == HADGEM"), vec![TemplateNode::entry("b", 2i64)]),
                ],
                vec![TemplateNode::entry("c", 3i64)],
            )],
        );

        let keys = |c: Candidate| c.entries().iter().map(|e| e.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(resolve(&template, &flags(&["CRU4"])).unwrap()), vec!["a"]);
        assert_eq!(keys(resolve(&template, &flags(&["HADGEM"])).unwrap()), vec!["b"]);
        assert_eq!(keys(resolve(&template, &flags(&["IPSL"])).unwrap()), vec!["c"]);
    }

    #[test]
    fn test_unselected_define_has_no_effect() {
        let template = Template::new(
            "t",
            vec![
                TemplateNode::when(
                    cond("NOCO2"),
                    vec![TemplateNode::define("FROM_RESTART", "").unwrap()],
                ),
                TemplateNode::if_else(
                    cond("FROM_RESTART"),
                    vec![TemplateNode::entry("restart", true)],
                    vec![TemplateNode::entry("restart", false)],
                ),
            ],
        );

        let off = resolve(&template, &flags(&[])).unwrap();
        assert_eq!(off.get("restart"), Some(&ResolvedValue::Bool(false)));

        let on = resolve(&template, &flags(&["NOCO2"])).unwrap();
        assert_eq!(on.get("restart"), Some(&ResolvedValue::Bool(true)));
    }

    #[test]
    fn test_include_splices_in_place() {
        let template = Template::new(
            "t",
            vec![
                TemplateNode::entry("first", 1i64),
                TemplateNode::include("param"),
                TemplateNode::entry("last", 3i64),
            ],
        )
        .with_fragment("param", vec![TemplateNode::entry("middle", 2i64)]);

        let candidate = resolve(&template, &flags(&[])).unwrap();
        let keys: Vec<&str> = candidate.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["first", "middle", "last"]);
    }

    #[test]
    fn test_unknown_include_carries_location() {
        let template = Template::new(
            "t",
            vec![TemplateNode::when(cond("CRU4"), vec![TemplateNode::include("missing")])],
        );
        let err = resolve(&template, &flags(&["CRU4"])).unwrap_err();
        assert!(matches!(err, Error::UnknownInclude { ref fragment, .. } if fragment == "missing"));
        assert_eq!(
            err.location(),
            Some("root > #0 if CRU4 > branch 0 > #0 include 'missing'")
        );
    }

    #[test]
    fn test_self_include_hits_depth_limit() {
        let template = Template::new("t", vec![TemplateNode::include("loop")])
            .with_fragment("loop", vec![TemplateNode::include("loop")]);
        let settings = ResolverSettings {
            max_include_depth: 5,
            ..ResolverSettings::default()
        };
        let flags = flags(&[]);
        let err = Resolver::new(&template, &flags)
            .with_settings(&settings)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::IncludeDepthExceeded { limit: 5, .. }));
    }

    #[test]
    fn test_macro_chain_hits_expansion_limit() {
        let mut root = vec![TemplateNode::define("m0", "base").unwrap()];
        for i in 1..10 {
            root.push(TemplateNode::define(format!("m{}", i), &format!("${{m{}}}", i - 1)).unwrap());
        }
        root.push(TemplateNode::entry("path", ValueExpr::mkstr("${m9}/grid.bin").unwrap()));
        let template = Template::new("t", root);
        let settings = ResolverSettings {
            max_expansion_depth: 4,
            ..ResolverSettings::default()
        };
        let flags = flags(&[]);
        let err = Resolver::new(&template, &flags)
            .with_settings(&settings)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::MacroDepthExceeded { limit: 4, .. }));
        assert_eq!(err.location(), Some("root > #10 entry 'path'"));

        let candidate = Resolver::new(&template, &flags).resolve().unwrap();
        assert_eq!(
            candidate.get("path").and_then(|v| v.as_text()),
            Some("base/grid.bin")
        );
    }

    #[test]
    fn test_last_write_wins_in_first_position() {
        let template = Template::new(
            "t",
            vec![
                TemplateNode::entry("nspinup", 7000i64),
                TemplateNode::entry("nspinyear", 30i64),
                TemplateNode::entry("nspinup", 390i64),
            ],
        );
        let candidate = resolve(&template, &flags(&[])).unwrap();
        assert_eq!(candidate.entries()[0].key, "nspinup");
        assert_eq!(candidate.entries()[0].value, ResolvedValue::Int(390));
        assert_eq!(candidate.entries().len(), 2);

        let overrides = candidate.overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].key, "nspinup");
        assert_eq!(overrides[0].locations.len(), 2);
    }

    #[test]
    fn test_output_accumulates() {
        let product = |id: &str| ValueExpr::product(id, "RAW", &format!("${{output}}/{}.bin", id)).unwrap();
        let template = Template::new(
            "t",
            vec![
                TemplateNode::define("output", "out").unwrap(),
                TemplateNode::entry("output", ValueExpr::List(vec![product("grid")])),
                TemplateNode::entry("output", ValueExpr::List(vec![product("sdate"), product("grid")])),
            ],
        );
        let candidate = resolve(&template, &flags(&[])).unwrap();
        let ids: Vec<&str> = candidate.outputs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["grid", "sdate", "grid"]);
        assert_eq!(candidate.outputs()[1].path, "out/sdate.bin");
        assert_eq!(candidate.output_dir(), Some("out"));
        assert!(candidate.overrides().is_empty());
    }

    #[test]
    fn test_malformed_condition_in_untaken_arm() {
        let template = Template::new(
            "t",
            vec![TemplateNode::chain(
                vec![
                    Branch::new(cond("CRU4"), vec![TemplateNode::entry("a", 1i64)]),
                    Branch::new(cond("climate == GISS"), vec![TemplateNode::entry("b", 2i64)]),
                ],
                Vec::new(),
            )],
        );
        let err = resolve(&template, &flags(&["CRU4"])).unwrap_err();
        assert!(matches!(err, Error::MalformedCondition { .. }));
        assert!(err.location().unwrap().starts_with("root > #0 if CRU4"));
    }

    #[test]
    fn test_undefined_macro_and_base_table_untouched() {
        let mut base = MacroTable::new();
        base.define("project_root", "/p/projects").unwrap();

        let template = Template::new(
            "t",
            vec![
                TemplateNode::define("scenario_dir", "${project_root}/CRU_4").unwrap(),
                TemplateNode::entry("path", ValueExpr::mkstr("${scenario_dir}/grid.bin").unwrap()),
                TemplateNode::entry("missing", ValueExpr::Macro("nowhere".into())),
            ],
        );
        let flags = flags(&[]);
        let err = Resolver::new(&template, &flags)
            .with_macros(&base)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::UndefinedMacro { ref name, .. } if name == "nowhere"));
        assert!(err.location().unwrap().ends_with("entry 'missing'"));
        assert!(!base.is_defined("scenario_dir"));
    }
}
