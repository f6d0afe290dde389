//! Input-dataset declarations and the option table that requires them.

use crate::manifest::{Candidate, ResolvedValue};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Key of the document section that declares input datasets.
pub const INPUT_KEY: &str = "input";

/// Names of the input datasets available to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDeclarations {
    names: BTreeSet<String>,
}

impl InputDeclarations {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Keys of the candidate's own `input` object, if it has one.
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        match candidate.get(INPUT_KEY)? {
            ResolvedValue::Object(fields) => Some(Self::from_names(fields.iter().map(|(k, _)| k.clone()))),
            _ => None,
        }
    }

    /// Parse either a list of names or a map whose keys are the names.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Names(Vec<String>),
            Map(serde_yaml::Mapping),
        }

        let raw: Option<Raw> = serde_yaml::from_str(source).context("invalid input declarations")?;
        Ok(match raw {
            None => Self::default(),
            Some(Raw::Names(names)) => Self::from_names(names),
            Some(Raw::Map(map)) => Self::from_names(
                map.keys()
                    .filter_map(|k| k.as_str().map(str::to_string)),
            ),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input declarations {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// When an option makes its dataset mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Option is the given symbol.
    Equals(&'static str),
    /// Option is set to anything but the given symbol.
    NotEquals(&'static str),
    /// Option is boolean `true`.
    Enabled,
}

impl Trigger {
    pub fn fires(&self, value: &ResolvedValue) -> bool {
        match self {
            Trigger::Equals(symbol) => value.as_text() == Some(*symbol),
            Trigger::NotEquals(symbol) => value.as_text().is_some_and(|v| v != *symbol),
            Trigger::Enabled => value.as_bool() == Some(true),
        }
    }
}

/// An option setting that needs an input dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRequirement {
    pub option: &'static str,
    pub trigger: Trigger,
    pub dataset: &'static str,
}

const fn req(option: &'static str, trigger: Trigger, dataset: &'static str) -> InputRequirement {
    InputRequirement {
        option,
        trigger,
        dataset,
    }
}

/// Options that read a dataset from the input section.
pub const INPUT_REQUIREMENTS: &[InputRequirement] = &[
    req("sowing_date_option", Trigger::Equals("PRESCRIBED_SDATE"), "sdate"),
    req("crop_phu_option", Trigger::Equals("PRESCRIBED_CROP_PHU"), "crop_phu"),
    req("tillage_type", Trigger::Equals("READ_TILLAGE"), "with_tillage"),
    req("residue_treatment", Trigger::Equals("READ_RESIDUE_DATA"), "residue_on_field"),
    req("fertilizer_input", Trigger::Enabled, "fertilizer_nr"),
    req("manure_input", Trigger::Enabled, "manure_nr"),
    req("landuse", Trigger::NotEquals("NO_LANDUSE"), "landuse"),
    req("wateruse", Trigger::NotEquals("NO_WATERUSE"), "wateruse"),
    req("population", Trigger::Enabled, "popdens"),
    req("reservoir", Trigger::Enabled, "reservoir"),
    req("prescribe_burntarea", Trigger::Enabled, "burntarea"),
    req("prescribe_landcover", Trigger::NotEquals("NO_LANDCOVER"), "landcover"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_list_and_map_forms() {
        let list = InputDeclarations::from_yaml_str("- sdate\n- crop_phu\n").unwrap();
        assert!(list.contains("sdate"));
        assert_eq!(list.len(), 2);

        let map = InputDeclarations::from_yaml_str(
            "sdate: {fmt: CLM, name: sdates.clm}\nlanduse: {fmt: CLM, name: lu.clm}\n",
        )
        .unwrap();
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["landuse", "sdate"]);

        assert!(InputDeclarations::from_yaml_str("").unwrap().is_empty());
    }

    #[test]
    fn test_triggers() {
        let sym = ResolvedValue::Symbol("PRESCRIBED_SDATE".into());
        assert!(Trigger::Equals("PRESCRIBED_SDATE").fires(&sym));
        assert!(!Trigger::Equals("FIXED_SDATE").fires(&sym));

        let no_lu = ResolvedValue::Symbol("NO_LANDUSE".into());
        assert!(!Trigger::NotEquals("NO_LANDUSE").fires(&no_lu));
        assert!(Trigger::NotEquals("NO_LANDUSE").fires(&ResolvedValue::Symbol("ALL_CROPS".into())));

        assert!(Trigger::Enabled.fires(&ResolvedValue::Bool(true)));
        assert!(!Trigger::Enabled.fires(&ResolvedValue::Bool(false)));
        assert!(!Trigger::Enabled.fires(&ResolvedValue::Int(1)));
    }

    #[test]
    fn test_from_candidate_reads_input_section() {
        let candidate = Candidate::new(
            vec![crate::manifest::ResolvedEntry {
                key: INPUT_KEY.into(),
                value: ResolvedValue::Object(vec![
                    ("soil".into(), ResolvedValue::Str("soil.bin".into())),
                    ("sdate".into(), ResolvedValue::Str("sdate.clm".into())),
                ]),
            }],
            None,
            Vec::new(),
        );
        let inputs = InputDeclarations::from_candidate(&candidate).unwrap();
        assert!(inputs.contains("sdate"));
        assert!(!inputs.contains("landuse"));
    }
}
