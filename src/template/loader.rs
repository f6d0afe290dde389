//! YAML template documents.
//!
//! Turns template source files into a [`Template`] plus the exclusive flag
//! groups and base macros they declare. This is the storage side of the
//! engine: the resolver itself never touches the filesystem.
//!
//! ```yaml
//! name: example
//! groups:
//!   climate: [HADGEM, CRU4]
//! macros:
//!   project_root: /p/projects/landuse
//! root:
//!   - entry: sim_name
//!     value: LPJmL Run
//!   - entry: radiation
//!     value: {$sym: CLOUDINESS}
//!   - if: "climate == CRU4"
//!     then:
//!       - define: output
//!         value: "${project_root}/CRU_4"
//!     elif:
//!       - if: HADGEM
//!         then: [{define: output, value: "${project_root}/HadGEM2-ES"}]
//!     else: []
//!   - include: param
//! fragments:
//!   param:
//!     - {entry: grid, value: {$mkstr: "${output}/grid.bin"}}
//! ```
//!
//! Plain YAML scalars are literals. Single-key maps whose key starts with `$`
//! are special forms: `$sym` (enumeration constant), `$mkstr` (interpolated
//! string) and `$macro` (value of one macro). Any other map is an object whose
//! field order is kept.

use super::{Branch, ConditionExpr, Template, TemplateNode, ValueExpr};
use crate::error::{Error, Result};
use crate::flags::{ExclusiveGroup, FlagSetBuilder};
use crate::macros::{MacroTable, MacroTemplate};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    macros: BTreeMap<String, Value>,
    #[serde(default)]
    root: Vec<RawNode>,
    #[serde(default)]
    fragments: BTreeMap<String, Vec<RawNode>>,
}

// Each shape rejects keys it does not know, so a misspelled `elif` or a
// stray `if` on an entry fails to parse instead of being dropped.
#[derive(Debug, Deserialize)]
#[serde(
    untagged,
    expecting = "a template node: {entry, value}, {define, value}, {include} or {if, then, elif, else}"
)]
enum RawNode {
    Entry(RawEntry),
    Define(RawDefine),
    Include(RawInclude),
    Conditional(RawConditional),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    entry: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefine {
    define: String,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInclude {
    include: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConditional {
    #[serde(rename = "if")]
    when: String,
    #[serde(default)]
    then: Vec<RawNode>,
    #[serde(default)]
    elif: Vec<RawBranch>,
    #[serde(default, rename = "else")]
    otherwise: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBranch {
    #[serde(rename = "if")]
    when: String,
    #[serde(default)]
    then: Vec<RawNode>,
}

/// A parsed template source: the tree plus the declarations that travel with it.
#[derive(Debug, Clone, Default)]
pub struct TemplateDocument {
    pub template: Template,
    pub groups: Vec<ExclusiveGroup>,
    pub macros: MacroTable,
}

impl TemplateDocument {
    /// Parse a template document from YAML text.
    pub fn from_yaml_str(source: &str, default_name: &str) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_str(source)
            .map_err(|e| Error::syntax(format!("template '{}'", default_name), e))?;
        let name = raw.name.unwrap_or_else(|| default_name.to_string());

        let groups = raw
            .groups
            .into_iter()
            .map(|(group, members)| ExclusiveGroup::new(group, members))
            .collect();

        let mut macros = MacroTable::new();
        for (macro_name, value) in raw.macros {
            let text = define_text(Some(value), &format!("macro '{}'", macro_name))?;
            macros.define_template(&macro_name, MacroTemplate::parse(&text)?);
        }

        let mut template = Template::new(&name, convert_nodes(raw.root, &name)?);
        for (fragment, nodes) in raw.fragments {
            let nodes = convert_nodes(nodes, &fragment)?;
            template.add_fragment(fragment, nodes);
        }

        Ok(Self {
            template,
            groups,
            macros,
        })
    }

    /// Load a template file, then pull in any included fragment that is not
    /// defined inline from a sibling `<fragment>.yaml` file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "template".to_string());

        let mut document = Self::from_yaml_str(&content, &name)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        document.load_missing_fragments(dir)?;
        Ok(document)
    }

    /// Load fragment files for includes that have no inline definition.
    ///
    /// Fragments that cannot be found are left missing: a resolution only
    /// fails on them if it actually takes a branch that includes them.
    pub fn load_missing_fragments(&mut self, dir: &Path) -> anyhow::Result<()> {
        loop {
            let missing: Vec<String> = self
                .template
                .referenced_includes()
                .into_iter()
                .filter(|name| !self.template.has_fragment(name))
                .collect();

            let mut loaded_any = false;
            for name in missing {
                if name.contains(['/', '\\']) || name.starts_with('.') {
                    warn!(fragment = %name, "Skipping include with a path-like name");
                    continue;
                }
                let file = dir.join(format!("{}.yaml", name));
                if !file.exists() {
                    debug!(fragment = %name, path = %file.display(), "No fragment file found");
                    continue;
                }
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read fragment {}", file.display()))?;
                let nodes = parse_fragment_yaml(&content, &name)?;
                debug!(fragment = %name, nodes = nodes.len(), "Loaded fragment file");
                self.template.add_fragment(name, nodes);
                loaded_any = true;
            }

            if !loaded_any {
                return Ok(());
            }
        }
    }

    /// A flag builder with this document's exclusive groups declared.
    pub fn flag_builder(&self) -> FlagSetBuilder {
        FlagSetBuilder::default().groups(self.groups.iter().cloned())
    }
}

/// Parse a fragment file: a bare YAML list of nodes.
pub fn parse_fragment_yaml(source: &str, name: &str) -> Result<Vec<TemplateNode>> {
    let raw: Option<Vec<RawNode>> = serde_yaml::from_str(source)
        .map_err(|e| Error::syntax(format!("fragment '{}'", name), e))?;
    convert_nodes(raw.unwrap_or_default(), name)
}

fn convert_nodes(raw: Vec<RawNode>, context: &str) -> Result<Vec<TemplateNode>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, node)| convert_node(node, &format!("{}#{}", context, i)))
        .collect()
}

fn convert_node(raw: RawNode, context: &str) -> Result<TemplateNode> {
    match raw {
        RawNode::Entry(RawEntry { entry, value }) => Ok(TemplateNode::Entry {
            value: convert_value(value, &format!("{} entry '{}'", context, entry))?,
            key: entry,
        }),
        RawNode::Define(RawDefine { define, value }) => {
            let text = define_text(value, &format!("{} define '{}'", context, define))?;
            Ok(TemplateNode::Define {
                name: define,
                template: MacroTemplate::parse(&text)?,
            })
        }
        RawNode::Include(RawInclude { include }) => Ok(TemplateNode::Include(include)),
        RawNode::Conditional(RawConditional {
            when,
            then,
            elif,
            otherwise,
        }) => {
            let mut branches = vec![Branch::new(
                ConditionExpr::parse(&when)?,
                convert_nodes(then, &format!("{} then", context))?,
            )];
            for (i, arm) in elif.into_iter().enumerate() {
                branches.push(Branch::new(
                    ConditionExpr::parse(&arm.when)?,
                    convert_nodes(arm.then, &format!("{} elif{}", context, i))?,
                ));
            }
            Ok(TemplateNode::Conditional {
                branches,
                otherwise: convert_nodes(otherwise, &format!("{} else", context))?,
            })
        }
    }
}

fn define_text(value: Option<Value>, context: &str) -> Result<String> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(Error::syntax(context, "macro values must be scalars")),
    }
}

fn convert_value(value: Value, context: &str) -> Result<ValueExpr> {
    match value {
        Value::Null => Err(Error::syntax(context, "null is not a valid value")),
        Value::Bool(b) => Ok(ValueExpr::Bool(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ValueExpr::Int(i)),
            None => n
                .as_f64()
                .map(ValueExpr::Float)
                .ok_or_else(|| Error::syntax(context, format!("number {} is out of range", n))),
        },
        Value::String(s) => Ok(ValueExpr::Str(s)),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| convert_value(item, &format!("{}[{}]", context, i)))
            .collect::<Result<Vec<_>>>()
            .map(ValueExpr::List),
        Value::Object(map) => {
            if map.len() == 1
                && let Some((key, inner)) = map.iter().next()
                && key.starts_with('$')
            {
                return special_form(key, inner, context);
            }
            map.into_iter()
                .map(|(key, inner)| {
                    let value = convert_value(inner, &format!("{}.{}", context, key))?;
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>>>()
                .map(ValueExpr::Object)
        }
    }
}

fn special_form(key: &str, inner: &Value, context: &str) -> Result<ValueExpr> {
    let Some(text) = inner.as_str() else {
        return Err(Error::syntax(context, format!("'{}' takes a string", key)));
    };
    match key {
        "$sym" => Ok(ValueExpr::Symbol(text.to_string())),
        "$mkstr" => Ok(ValueExpr::MkStr(MacroTemplate::parse(text)?)),
        "$macro" => Ok(ValueExpr::Macro(text.to_string())),
        other => Err(Error::syntax(
            context,
            format!("unknown special form '{}' (expected $sym, $mkstr or $macro)", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOC: &str = r#"
name: sample
groups:
  climate: [HADGEM, CRU4]
macros:
  project_root: /p/projects/landuse
root:
  - entry: sim_name
    value: LPJmL Run
  - entry: radiation
    value: {$sym: CLOUDINESS}
  - if: "climate == CRU4"
    then:
      - define: output
        value: "${project_root}/CRU_4"
    elif:
      - if: HADGEM
        then: [{define: output, value: "${project_root}/HadGEM2-ES"}]
    else:
      - define: NO_CLIMATE
  - entry: output
    value:
      - {id: {$sym: GRID}, file: {fmt: {$sym: RAW}, name: {$mkstr: "${output}/grid.bin"}}}
  - include: param
fragments:
  param:
    - {entry: laimax, value: 5}
    - {entry: scale, value: 0.5}
"#;

    #[test]
    fn test_parse_document() {
        let doc = TemplateDocument::from_yaml_str(DOC, "fallback").unwrap();
        assert_eq!(doc.template.name(), "sample");
        assert_eq!(doc.groups, vec![ExclusiveGroup::new("climate", ["HADGEM", "CRU4"])]);
        assert!(doc.macros.is_defined("project_root"));

        let root = doc.template.root();
        assert_eq!(root.len(), 5);
        assert_eq!(root[0], TemplateNode::entry("sim_name", "LPJmL Run"));
        assert_eq!(
            root[1],
            TemplateNode::entry("radiation", ValueExpr::symbol("CLOUDINESS"))
        );
        match &root[2] {
            TemplateNode::Conditional {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].when, ConditionExpr::is("climate", "CRU4"));
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("expected conditional, got {:?}", other),
        }
        assert_eq!(
            root[3],
            TemplateNode::entry(
                "output",
                ValueExpr::List(vec![
                    ValueExpr::product("GRID", "RAW", "${output}/grid.bin").unwrap()
                ])
            )
        );

        let param = doc.template.fragment("param").unwrap();
        assert_eq!(param[0], TemplateNode::entry("laimax", 5i64));
        assert_eq!(param[1], TemplateNode::entry("scale", 0.5f64));
    }

    #[test]
    fn test_unknown_special_form_rejected() {
        let src = "root:\n  - {entry: x, value: {$env: HOME}}\n";
        let err = TemplateDocument::from_yaml_str(src, "bad").unwrap_err();
        assert!(err.to_string().contains("unknown special form"));
    }

    #[test]
    fn test_bad_condition_rejected() {
        let src = "root:\n  - {if: \"A &&\", then: []}\n";
        assert!(matches!(
            TemplateDocument::from_yaml_str(src, "bad"),
            Err(Error::TemplateSyntax { .. })
        ));
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let src = "rooot: []\n";
        assert!(TemplateDocument::from_yaml_str(src, "bad").is_err());
    }

    #[test]
    fn test_misspelled_elif_rejected() {
        let src = r#"
root:
  - if: CRU4
    then: [{entry: a, value: 1}]
    elsif:
      - {if: HADGEM, then: [{entry: b, value: 2}]}
"#;
        assert!(matches!(
            TemplateDocument::from_yaml_str(src, "bad"),
            Err(Error::TemplateSyntax { .. })
        ));
    }

    #[test]
    fn test_condition_on_entry_rejected() {
        let src = "root:\n  - {entry: c, value: 3, if: NEVER}\n";
        assert!(matches!(
            TemplateDocument::from_yaml_str(src, "bad"),
            Err(Error::TemplateSyntax { .. })
        ));
    }

    #[test]
    fn test_unknown_key_in_elif_arm_rejected() {
        let src = "root:\n  - {if: A, elif: [{if: B, then: [], else: []}]}\n";
        assert!(TemplateDocument::from_yaml_str(src, "bad").is_err());
        assert!(parse_fragment_yaml("- {include: param, when: A}\n", "frag").is_err());
    }

    #[test]
    fn test_from_path_loads_sibling_fragments() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("main.yaml"),
            "root:\n  - include: param\n  - include: missing\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join("param.yaml"),
            "- {entry: laimax, value: 5}\n- include: soil\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("soil.yaml"), "- {entry: soilpar, value: par/soil.js}\n")
            .unwrap();

        let doc = TemplateDocument::from_path(temp.path().join("main.yaml")).unwrap();
        assert_eq!(doc.template.name(), "main");
        assert!(doc.template.has_fragment("param"));
        assert!(doc.template.has_fragment("soil"));
        assert!(!doc.template.has_fragment("missing"));
    }

    #[test]
    fn test_empty_fragment_file() {
        assert!(parse_fragment_yaml("", "empty").unwrap().is_empty());
    }
}
