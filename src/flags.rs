//! Feature flags and mutually exclusive flag groups.
//!
//! A [`FlagSet`] is built once per resolution from `name -> value` pairs and
//! never changes afterwards. Members of a declared [`ExclusiveGroup`] may be
//! set directly (`CRU4`) or through the group (`climate=CRU4`); both spellings
//! select the same variant. Flags the template tests but the caller never set
//! are simply inactive.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A named set of flags of which at most one may be active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveGroup {
    pub name: String,
    pub members: Vec<String>,
}

impl ExclusiveGroup {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

/// Value assigned to a flag by the flag source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagValue {
    On,
    Off,
    /// Selected member of an exclusive group.
    Variant(String),
}

impl FlagValue {
    /// Interpret a raw value: boolean spellings map to `On`/`Off`, anything
    /// else names a group variant.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "1" | "true" | "on" | "yes" => FlagValue::On,
            "0" | "false" | "off" | "no" => FlagValue::Off,
            _ => FlagValue::Variant(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::On => write!(f, "on"),
            FlagValue::Off => write!(f, "off"),
            FlagValue::Variant(v) => write!(f, "{}", v),
        }
    }
}

/// Parse a `NAME[=VALUE]` assignment as supplied on a command line.
pub fn parse_assignment(raw: &str) -> Result<(String, FlagValue)> {
    let (name, value) = match raw.split_once('=') {
        Some((name, value)) => (name.trim(), FlagValue::parse(value)),
        None => (raw.trim(), FlagValue::On),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidFlagValue {
            flag: name.to_string(),
            value: raw.to_string(),
            reason: "flag names must be non-empty identifiers".to_string(),
        });
    }
    Ok((name.to_string(), value))
}

/// Immutable set of active flags for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    groups: Vec<ExclusiveGroup>,
    /// Every active flag name, including selected group members.
    active: BTreeSet<String>,
    /// Selected variant per group name.
    selected: BTreeMap<String, String>,
}

impl FlagSet {
    pub fn builder() -> FlagSetBuilder {
        FlagSetBuilder::default()
    }

    /// An empty flag set with no declared groups.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Selected member of a group; `None` when the group is unset or undeclared.
    pub fn enum_value(&self, group: &str) -> Option<&str> {
        self.selected.get(group).map(String::as_str)
    }

    pub fn group(&self, name: &str) -> Option<&ExclusiveGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn groups(&self) -> &[ExclusiveGroup] {
        &self.groups
    }

    pub fn active_flags(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    /// Stable label for this combination, e.g. `CRU4+FROM_RESTART`.
    pub fn label(&self) -> String {
        if self.active.is_empty() {
            "default".to_string()
        } else {
            self.active_flags().collect::<Vec<_>>().join("+")
        }
    }
}

/// Collects declarations and assignments, then validates them in [`build`].
///
/// [`build`]: FlagSetBuilder::build
#[derive(Debug, Clone, Default)]
pub struct FlagSetBuilder {
    groups: Vec<ExclusiveGroup>,
    assignments: Vec<(String, FlagValue)>,
}

impl FlagSetBuilder {
    pub fn group(mut self, group: ExclusiveGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = ExclusiveGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Turn a boolean flag (or a group member) on.
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.set(name, FlagValue::On)
    }

    pub fn set(mut self, name: impl Into<String>, value: FlagValue) -> Self {
        self.assignments.push((name.into(), value));
        self
    }

    /// Add a raw `NAME[=VALUE]` assignment.
    pub fn assign(self, raw: &str) -> Result<Self> {
        let (name, value) = parse_assignment(raw)?;
        Ok(self.set(name, value))
    }

    pub fn build(self) -> Result<FlagSet> {
        let mut active: BTreeSet<String> = BTreeSet::new();
        let mut via_group: BTreeMap<String, String> = BTreeMap::new();

        for (name, value) in self.assignments {
            if let Some(group) = self.groups.iter().find(|g| g.name == name) {
                match value {
                    FlagValue::Variant(variant) => {
                        if !group.contains(&variant) {
                            return Err(Error::InvalidFlagValue {
                                flag: name,
                                value: variant,
                                reason: format!(
                                    "expected one of: {}",
                                    group.members.join(", ")
                                ),
                            });
                        }
                        if let Some(previous) = via_group.get(&name)
                            && previous != &variant
                        {
                            return Err(Error::ConflictingFlags {
                                group: name,
                                first: previous.clone(),
                                second: variant,
                            });
                        }
                        via_group.insert(name, variant);
                    }
                    FlagValue::Off => {
                        via_group.remove(&name);
                    }
                    FlagValue::On => {
                        return Err(Error::InvalidFlagValue {
                            flag: name,
                            value: "on".to_string(),
                            reason: "exclusive groups take a variant name".to_string(),
                        });
                    }
                }
                continue;
            }

            match value {
                FlagValue::On => {
                    active.insert(name);
                }
                FlagValue::Off => {
                    // Switching a member off also clears a `group=member` selection.
                    via_group.retain(|_, selected| selected != &name);
                    active.remove(&name);
                }
                FlagValue::Variant(variant) => {
                    return Err(Error::InvalidFlagValue {
                        flag: name,
                        value: variant,
                        reason: "not a declared exclusive group; use on/off".to_string(),
                    });
                }
            }
        }

        let mut selected = BTreeMap::new();
        for group in &self.groups {
            let mut chosen: Vec<&str> = group
                .members
                .iter()
                .filter(|m| active.contains(m.as_str()))
                .map(String::as_str)
                .collect();
            if let Some(variant) = via_group.get(&group.name)
                && !chosen.contains(&variant.as_str())
            {
                chosen.insert(0, variant.as_str());
            }
            if chosen.len() > 1 {
                return Err(Error::ConflictingFlags {
                    group: group.name.clone(),
                    first: chosen[0].to_string(),
                    second: chosen[1].to_string(),
                });
            }
            if let Some(variant) = chosen.first() {
                selected.insert(group.name.clone(), variant.to_string());
            }
        }
        active.extend(selected.values().cloned());

        Ok(FlagSet {
            groups: self.groups,
            active,
            selected,
        })
    }
}
