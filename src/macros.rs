//! Symbolic macros and string interpolation.
//!
//! A macro value is a [`MacroTemplate`]: literal text with `${NAME}`
//! references to other macros, spliced by concatenation (`$$` is a literal
//! dollar sign). This is how path fragments are composed, e.g. an output
//! directory macro joined with a file name.
//!
//! Expansion is lazy, like a preprocessor: a reference is looked up when the
//! referring value is expanded, not when it is defined. Results are memoised
//! until the next [`MacroTable::define`], since a redefinition can change any
//! value that depends on it.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(String),
}

/// A parsed interpolation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MacroTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((at, c)) = chars.next() {
            if c != '$' {
                text.push(c);
                continue;
            }
            match chars.peek() {
                Some((_, '$')) => {
                    chars.next();
                    text.push('$');
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(Error::syntax(
                            format!("template '{}'", source),
                            format!("unterminated '${{' at offset {}", at),
                        ));
                    }
                    let name = name.trim();
                    if !is_identifier(name) {
                        return Err(Error::syntax(
                            format!("template '{}'", source),
                            format!("invalid macro name '{}' at offset {}", name, at),
                        ));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Ref(name.to_string()));
                }
                _ => text.push('$'),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// A template with no references.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Text(text.clone())]
        };
        Self {
            source: text.replace('$', "$$"),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names referenced by this template, in order of appearance.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }
}

impl fmt::Display for MacroTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Mapping from macro name to value template.
///
/// A table passed to the resolver is only read; the resolver works on its own
/// copy so definitions made inside conditional branches stay local to one
/// flag combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroTable {
    defs: BTreeMap<String, MacroTemplate>,
    cache: BTreeMap<String, String>,
    max_depth: usize,
}

/// Default limit on nested macro references during one expansion.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 64;

impl Default for MacroTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroTable {
    pub const fn new() -> Self {
        Self {
            defs: BTreeMap::new(),
            cache: BTreeMap::new(),
            max_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }

    /// Limit how deeply macro references may nest in one expansion.
    pub fn set_max_depth(&mut self, limit: usize) {
        self.max_depth = limit;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parse `template` and define `name` with it.
    pub fn define(&mut self, name: &str, template: &str) -> Result<()> {
        let template = MacroTemplate::parse(template)?;
        self.define_template(name, template);
        Ok(())
    }

    pub fn define_template(&mut self, name: &str, template: MacroTemplate) {
        if let Some(previous) = self.defs.get(name)
            && previous != &template
        {
            debug!(
                macro_name = name,
                previous = %previous,
                value = %template,
                "Macro redefined"
            );
        }
        self.defs.insert(name.to_string(), template);
        self.cache.clear();
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MacroTemplate> {
        self.defs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Fully expand the macro `name`.
    pub fn resolve(&mut self, name: &str) -> Result<String> {
        let mut stack = Vec::new();
        self.resolve_with(name, &mut stack)
    }

    /// Expand an arbitrary template against this table.
    pub fn expand(&mut self, template: &MacroTemplate) -> Result<String> {
        let mut stack = Vec::new();
        self.expand_segments(template.segments(), &mut stack)
    }

    fn resolve_with(&mut self, name: &str, stack: &mut Vec<String>) -> Result<String> {
        if let Some(value) = self.cache.get(name) {
            return Ok(value.clone());
        }
        if let Some(start) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::MacroCycle {
                cycle,
                location: String::new(),
            });
        }
        if stack.len() >= self.max_depth {
            return Err(Error::MacroDepthExceeded {
                name: name.to_string(),
                limit: self.max_depth,
                location: String::new(),
            });
        }
        let Some(template) = self.defs.get(name).cloned() else {
            return Err(Error::UndefinedMacro {
                name: name.to_string(),
                referenced_by: stack.last().cloned(),
                location: String::new(),
            });
        };

        stack.push(name.to_string());
        let value = self.expand_segments(template.segments(), stack)?;
        stack.pop();

        self.cache.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn expand_segments(&mut self, segments: &[Segment], stack: &mut Vec<String>) -> Result<String> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Ref(name) => out.push_str(&self.resolve_with(name, stack)?),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let t = MacroTemplate::parse("${output}/pft_harvest.${SUFFIX}").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Ref("output".into()),
                Segment::Text("/pft_harvest.".into()),
                Segment::Ref("SUFFIX".into()),
            ]
        );
        assert_eq!(t.references().collect::<Vec<_>>(), vec!["output", "SUFFIX"]);
    }

    #[test]
    fn test_parse_escapes_and_bare_dollar() {
        let t = MacroTemplate::parse("cost $$5 or $x").unwrap();
        assert_eq!(t.segments(), &[Segment::Text("cost $5 or $x".into())]);
    }

    #[test]
    fn test_parse_rejects_unterminated_and_bad_names() {
        assert!(matches!(
            MacroTemplate::parse("${output/grid.bin"),
            Err(Error::TemplateSyntax { .. })
        ));
        assert!(matches!(
            MacroTemplate::parse("${9lives}"),
            Err(Error::TemplateSyntax { .. })
        ));
    }

    #[test]
    fn test_literal_round_trips_dollar() {
        let t = MacroTemplate::literal("a$b");
        assert_eq!(t.source(), "a$$b");
        assert_eq!(MacroTemplate::parse(t.source()).unwrap(), t);
    }

    #[test]
    fn test_long_chain_hits_depth_limit() {
        let mut table = MacroTable::new();
        table.define("m0", "base").unwrap();
        for i in 1..2000 {
            table.define(&format!("m{}", i), &format!("${{m{}}}", i - 1)).unwrap();
        }
        let err = table.resolve("m1999").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MacroDepthExceeded);
        assert!(matches!(err, Error::MacroDepthExceeded { limit: 64, .. }));
        assert_eq!(table.resolve("m40").unwrap(), "base");
    }

    #[test]
    fn test_chain_within_limit_resolves() {
        let mut table = MacroTable::new();
        table.set_max_depth(3);
        table.define("a", "x").unwrap();
        table.define("b", "${a}").unwrap();
        table.define("c", "${b}").unwrap();
        table.define("d", "${c}").unwrap();
        assert_eq!(table.resolve("c").unwrap(), "x");

        let mut fresh = table.clone();
        fresh.define("e", "y").unwrap();
        assert!(matches!(
            fresh.resolve("d"),
            Err(Error::MacroDepthExceeded { limit: 3, .. })
        ));
    }

    #[test]
    fn test_nested_resolution() {
        let mut table = MacroTable::new();
        table.define("root", "/p/projects/landuse").unwrap();
        table.define("scenario_dir", "${root}/CRU_4").unwrap();
        table.define("output", "${scenario_dir}/noco2").unwrap();
        assert_eq!(table.resolve("output").unwrap(), "/p/projects/landuse/CRU_4/noco2");
    }

    #[test]
    fn test_redefinition_invalidates_cache() {
        let mut table = MacroTable::new();
        table.define("SUFFIX", "pft.bin").unwrap();
        table.define("file", "harvest.${SUFFIX}").unwrap();
        assert_eq!(table.resolve("file").unwrap(), "harvest.pft.bin");

        table.define("SUFFIX", "grid.bin").unwrap();
        assert_eq!(table.resolve("file").unwrap(), "harvest.grid.bin");
    }

    #[test]
    fn test_undefined_reports_referrer() {
        let mut table = MacroTable::new();
        table.define("output", "${scenario_dir}/noco2").unwrap();
        let err = table.resolve("output").unwrap_err();
        assert_eq!(
            err,
            Error::UndefinedMacro {
                name: "scenario_dir".into(),
                referenced_by: Some("output".into()),
                location: String::new(),
            }
        );
    }

    #[test]
    fn test_two_macro_cycle_rejected() {
        let mut table = MacroTable::new();
        table.define("A", "x${B}").unwrap();
        table.define("B", "y${A}").unwrap();
        let err = table.resolve("A").unwrap_err();
        assert_eq!(
            err,
            Error::MacroCycle {
                cycle: vec!["A".into(), "B".into(), "A".into()],
                location: String::new(),
            }
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut table = MacroTable::new();
        table.define("A", "${A}").unwrap();
        assert!(matches!(table.resolve("A"), Err(Error::MacroCycle { .. })));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut table = MacroTable::new();
        table.define("base", "b").unwrap();
        table.define("left", "${base}l").unwrap();
        table.define("right", "${base}r").unwrap();
        table.define("top", "${left}-${right}").unwrap();
        assert_eq!(table.resolve("top").unwrap(), "bl-br");
    }

    #[test]
    fn test_empty_definition_counts_as_defined() {
        let mut table = MacroTable::new();
        table.define("FROM_RESTART", "").unwrap();
        assert!(table.is_defined("FROM_RESTART"));
        assert_eq!(table.resolve("FROM_RESTART").unwrap(), "");
    }
}
