//! The built-in LPJmL/MAgPIE run configuration.
//!
//! Root template and its `param` and `input_magpie` fragments are compiled
//! into the binary as YAML.

use crate::error::Result;
use crate::template::TemplateDocument;
use crate::template::loader::parse_fragment_yaml;

pub const NAME: &str = "lpjml_magpie";

const ROOT: &str = include_str!("../templates/lpjml_magpie.yaml");

const FRAGMENTS: &[(&str, &str)] = &[
    ("param", include_str!("../templates/param.yaml")),
    ("input_magpie", include_str!("../templates/input_magpie.yaml")),
];

/// Parse the embedded scenario.
pub fn lpjml_magpie() -> Result<TemplateDocument> {
    let mut document = TemplateDocument::from_yaml_str(ROOT, NAME)?;
    for (name, source) in FRAGMENTS {
        let nodes = parse_fragment_yaml(source, name)?;
        document.template.add_fragment(*name, nodes);
    }
    Ok(document)
}
