//! The individual checks, in the order they run.

use super::inputs::{INPUT_KEY, INPUT_REQUIREMENTS, InputDeclarations};
use super::{Rule, ValidationError};
use crate::config::{DuplicatePolicy, ValidatorSettings};
use crate::manifest::{Candidate, OUTPUT_KEY, ResolvedValue};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub(super) struct Context<'a> {
    pub candidate: &'a Candidate,
    pub inputs: Option<&'a InputDeclarations>,
    pub settings: &'a ValidatorSettings,
}

pub(super) type RuleFn = fn(&Context<'_>) -> Vec<ValidationError>;

pub(super) const RULES: &[RuleFn] = &[
    year_ordering,
    restart_consistency,
    spinup_consistency,
    output_path,
    input_reference,
    option_compatibility,
    duplicate_output,
    duplicate_key,
];

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{[^}]*\}").ok());

fn int_field(
    ctx: &Context<'_>,
    rule: Rule,
    key: &str,
    required: bool,
    out: &mut Vec<ValidationError>,
) -> Option<i64> {
    match ctx.candidate.get(key) {
        None => {
            if required {
                out.push(ValidationError::new(rule, [key], format!("{} is required", key)));
            }
            None
        }
        Some(ResolvedValue::Int(i)) => Some(*i),
        Some(other) => {
            out.push(ValidationError::new(
                rule,
                [key],
                format!("{} must be an integer, found {}", key, other.kind()),
            ));
            None
        }
    }
}

/// Missing counts as `false`.
fn bool_field(ctx: &Context<'_>, rule: Rule, key: &str, out: &mut Vec<ValidationError>) -> bool {
    match ctx.candidate.get(key) {
        None => false,
        Some(ResolvedValue::Bool(b)) => *b,
        Some(other) => {
            out.push(ValidationError::new(
                rule,
                [key],
                format!("{} must be a boolean, found {}", key, other.kind()),
            ));
            false
        }
    }
}

/// Non-empty string value; empty strings count as unset.
fn text_field<'a>(ctx: &Context<'a>, key: &str) -> Option<&'a str> {
    ctx.candidate
        .get(key)
        .and_then(ResolvedValue::as_text)
        .filter(|s| !s.is_empty())
}

/// Lexically normalised path components, so `a/b/../c` and `a/c` compare equal.
fn normalize(path: &str) -> (bool, Vec<&str>) {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    (path.starts_with('/'), parts)
}

fn same_file(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn year_ordering(ctx: &Context<'_>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    let rule = Rule::YearOrdering;
    let first = int_field(ctx, rule, "firstyear", true, &mut out);
    let last = int_field(ctx, rule, "lastyear", true, &mut out);
    if let (Some(first), Some(last)) = (first, last)
        && first > last
    {
        out.push(ValidationError::new(
            rule,
            ["firstyear", "lastyear"],
            format!("firstyear {} is after lastyear {}", first, last),
        ));
    }
    out
}

fn restart_consistency(ctx: &Context<'_>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    let rule = Rule::RestartConsistency;
    let restart = bool_field(ctx, rule, "restart", &mut out);
    let write_restart = bool_field(ctx, rule, "write_restart", &mut out);
    let read_file = text_field(ctx, "restart_filename");
    let write_file = text_field(ctx, "write_restart_filename");

    if restart {
        match read_file {
            None => out.push(ValidationError::new(
                rule,
                ["restart", "restart_filename"],
                "restart is enabled but restart_filename is not set",
            )),
            Some(read) => {
                if let Some(write) = write_file
                    && same_file(read, write)
                {
                    out.push(ValidationError::new(
                        rule,
                        ["restart_filename", "write_restart_filename"],
                        format!("run would overwrite its own input restart file '{}'", read),
                    ));
                }
            }
        }
    }

    if write_restart && write_file.is_none() {
        out.push(ValidationError::new(
            rule,
            ["write_restart", "write_restart_filename"],
            "write_restart is enabled but write_restart_filename is not set",
        ));
    }

    // Year bounds are reported by year-ordering; only compare when present.
    let first = ctx.candidate.get("firstyear").and_then(ResolvedValue::as_int);
    let last = ctx.candidate.get("lastyear").and_then(ResolvedValue::as_int);
    if let Some(year) = int_field(ctx, rule, "restart_year", false, &mut out)
        && let (Some(first), Some(last)) = (first, last)
    {
        // A checkpoint inside the run, or a spinup completion year before it.
        let limit = if write_restart { last } else { first };
        if year > limit {
            out.push(ValidationError::new(
                rule,
                ["restart_year", if write_restart { "lastyear" } else { "firstyear" }],
                if write_restart {
                    format!("restart_year {} is after the run ends ({})", year, last)
                } else {
                    format!(
                        "restart_year {} must be a spinup completion year <= firstyear {}",
                        year, first
                    )
                },
            ));
        }
    }

    if let Some(checkpoint) = text_field(ctx, "checkpoint_filename") {
        for (key, file) in [
            ("restart_filename", read_file),
            ("write_restart_filename", write_file),
        ] {
            if let Some(file) = file
                && same_file(checkpoint, file)
            {
                out.push(ValidationError::new(
                    rule,
                    ["checkpoint_filename", key],
                    format!("checkpoint_filename collides with {}", key),
                ));
            }
        }
    }
    out
}

fn spinup_consistency(ctx: &Context<'_>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    let rule = Rule::SpinupConsistency;
    if let Some(n) = int_field(ctx, rule, "nspinup", true, &mut out)
        && n < 0
    {
        out.push(ValidationError::new(
            rule,
            ["nspinup"],
            format!("nspinup must be >= 0, found {}", n),
        ));
    }
    if let Some(n) = int_field(ctx, rule, "nspinyear", true, &mut out)
        && n <= 0
    {
        out.push(ValidationError::new(
            rule,
            ["nspinyear"],
            format!("nspinyear must be > 0, found {}", n),
        ));
    }
    out
}

fn output_path(ctx: &Context<'_>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    let rule = Rule::OutputPath;
    for (index, product) in ctx.candidate.outputs().iter().enumerate() {
        let at = |field: &str| format!("{}[{}].{}", OUTPUT_KEY, index, field);
        if product.id.is_empty() {
            out.push(ValidationError::new(rule, [at("id")], "output product has no id"));
        }
        if !product.format.is_recognized() {
            out.push(ValidationError::new(
                rule,
                [at("file.fmt")],
                format!("unrecognised output format '{}'", product.format),
            ));
        }
        if product.path.is_empty() {
            out.push(ValidationError::new(
                rule,
                [at("file.name")],
                format!("output '{}' has an empty path", product.id),
            ));
        } else if let Some(re) = PLACEHOLDER.as_ref() {
            let leftover: Vec<&str> = re.find_iter(&product.path).map(|m| m.as_str()).collect();
            if !leftover.is_empty() {
                out.push(ValidationError::new(
                    rule,
                    [at("file.name")],
                    format!(
                        "output '{}' path '{}' has unexpanded {}",
                        product.id,
                        product.path,
                        leftover.join(", ")
                    ),
                ));
            }
        }
    }
    out
}

fn input_reference(ctx: &Context<'_>) -> Vec<ValidationError> {
    let Some(inputs) = ctx.inputs else {
        return Vec::new();
    };
    INPUT_REQUIREMENTS
        .iter()
        .filter(|req| {
            ctx.candidate
                .get(req.option)
                .is_some_and(|value| req.trigger.fires(value))
                && !inputs.contains(req.dataset)
        })
        .map(|req| {
            ValidationError::new(
                Rule::InputReference,
                [req.option.to_string(), format!("{}.{}", INPUT_KEY, req.dataset)],
                format!(
                    "{} requires input dataset '{}' which is not declared",
                    req.option, req.dataset
                ),
            )
        })
        .collect()
}

fn option_compatibility(ctx: &Context<'_>) -> Vec<ValidationError> {
    let symbol = |key: &str| ctx.candidate.get(key).and_then(ResolvedValue::as_text);
    if symbol("crop_phu_option") == Some("PRESCRIBED_CROP_PHU")
        && symbol("sowing_date_option") != Some("PRESCRIBED_SDATE")
    {
        return vec![ValidationError::new(
            Rule::OptionCompatibility,
            ["crop_phu_option", "sowing_date_option"],
            "PRESCRIBED_CROP_PHU requires sowing_date_option PRESCRIBED_SDATE",
        )];
    }
    Vec::new()
}

fn finding(
    policy: DuplicatePolicy,
    rule: Rule,
    fields: Vec<String>,
    message: String,
) -> Option<ValidationError> {
    match policy {
        DuplicatePolicy::Allow => None,
        DuplicatePolicy::Warn => Some(ValidationError::warning(rule, fields, message)),
        DuplicatePolicy::Reject => Some(ValidationError::new(rule, fields, message)),
    }
}

fn duplicate_output(ctx: &Context<'_>) -> Vec<ValidationError> {
    let mut seen: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut order = Vec::new();
    for (index, product) in ctx.candidate.outputs().iter().enumerate() {
        if product.id.is_empty() {
            continue;
        }
        let slots = seen.entry(&product.id).or_default();
        if slots.is_empty() {
            order.push(product.id.as_str());
        }
        slots.push(index);
    }

    order
        .into_iter()
        .filter_map(|id| {
            let slots = &seen[id];
            if slots.len() < 2 {
                return None;
            }
            finding(
                ctx.settings.duplicate_outputs,
                Rule::DuplicateOutput,
                slots.iter().map(|i| format!("{}[{}]", OUTPUT_KEY, i)).collect(),
                format!("output '{}' is declared {} times", id, slots.len()),
            )
        })
        .collect()
}

fn duplicate_key(ctx: &Context<'_>) -> Vec<ValidationError> {
    ctx.candidate
        .overrides()
        .iter()
        .filter_map(|o| {
            finding(
                ctx.settings.duplicate_keys,
                Rule::DuplicateKey,
                vec![o.key.clone()],
                format!(
                    "'{}' is written {} times; the last write at {} wins",
                    o.key,
                    o.locations.len(),
                    o.locations.last().map(String::as_str).unwrap_or("?")
                ),
            )
        })
        .collect()
}
