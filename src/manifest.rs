//! Resolved documents: the unvalidated [`Candidate`] the resolver emits and
//! the immutable [`Manifest`] the validator hands back.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level key holding the output-product list.
pub const OUTPUT_KEY: &str = "output";

/// A fully expanded value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    List(Vec<ResolvedValue>),
    Object(Vec<(String, ResolvedValue)>),
}

impl ResolvedValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResolvedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ResolvedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String or symbol text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResolvedValue::Str(s) | ResolvedValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedValue> {
        match self {
            ResolvedValue::Object(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedValue::Bool(_) => "boolean",
            ResolvedValue::Int(_) => "integer",
            ResolvedValue::Float(_) => "number",
            ResolvedValue::Str(_) => "string",
            ResolvedValue::Symbol(_) => "symbol",
            ResolvedValue::List(_) => "list",
            ResolvedValue::Object(_) => "object",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ResolvedValue::Bool(b) => Value::Bool(*b),
            ResolvedValue::Int(i) => Value::from(*i),
            ResolvedValue::Float(f) => Value::from(*f),
            ResolvedValue::Str(s) | ResolvedValue::Symbol(s) => Value::String(s.clone()),
            ResolvedValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ResolvedValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl Serialize for ResolvedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResolvedValue::Bool(b) => serializer.serialize_bool(*b),
            ResolvedValue::Int(i) => serializer.serialize_i64(*i),
            ResolvedValue::Float(f) => serializer.serialize_f64(*f),
            ResolvedValue::Str(s) | ResolvedValue::Symbol(s) => serializer.serialize_str(s),
            ResolvedValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ResolvedValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Bool(b) => write!(f, "{}", b),
            ResolvedValue::Int(i) => write!(f, "{}", i),
            ResolvedValue::Float(x) => write!(f, "{}", x),
            ResolvedValue::Str(s) => write!(f, "\"{}\"", s),
            ResolvedValue::Symbol(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntry {
    pub key: String,
    pub value: ResolvedValue,
}

/// Storage format of an output product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Raw,
    Clm,
    Clm2,
    Txt,
    Cdf,
    Meta,
    Sock,
    /// Anything else, kept verbatim so the validator can report it.
    Unrecognized(String),
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "RAW" => OutputFormat::Raw,
            "CLM" => OutputFormat::Clm,
            "CLM2" => OutputFormat::Clm2,
            "TXT" => OutputFormat::Txt,
            "CDF" => OutputFormat::Cdf,
            "META" => OutputFormat::Meta,
            "SOCK" => OutputFormat::Sock,
            other => OutputFormat::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OutputFormat::Raw => "RAW",
            OutputFormat::Clm => "CLM",
            OutputFormat::Clm2 => "CLM2",
            OutputFormat::Txt => "TXT",
            OutputFormat::Cdf => "CDF",
            OutputFormat::Meta => "META",
            OutputFormat::Sock => "SOCK",
            OutputFormat::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, OutputFormat::Unrecognized(_))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OutputFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One declared output product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputProduct {
    pub id: String,
    pub format: OutputFormat,
    pub path: String,
}

impl OutputProduct {
    /// Read a product from `{id, file: {fmt, name}}` or the flat
    /// `{id, format, path}` shape. Missing parts come back empty for the
    /// validator to report.
    pub fn from_value(value: &ResolvedValue) -> Self {
        fn text(v: Option<&ResolvedValue>) -> &str {
            v.and_then(ResolvedValue::as_text).unwrap_or("")
        }
        let id = text(value.field("id")).to_string();
        let (format, path) = match value.field("file") {
            Some(file) => (text(file.field("fmt")), text(file.field("name"))),
            None => (text(value.field("format")), text(value.field("path"))),
        };
        Self {
            id,
            format: OutputFormat::parse(format),
            path: path.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "file": { "fmt": self.format.as_str(), "name": self.path },
        })
    }
}

/// A top-level key that was written more than once; the last write won.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Override {
    pub key: String,
    /// Node locations of every write, in document order.
    pub locations: Vec<String>,
}

/// Resolver output before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    entries: Vec<ResolvedEntry>,
    outputs: Vec<OutputProduct>,
    output_dir: Option<String>,
    overrides: Vec<Override>,
}

impl Candidate {
    pub fn new(
        entries: Vec<ResolvedEntry>,
        output_dir: Option<String>,
        overrides: Vec<Override>,
    ) -> Self {
        let outputs = entries
            .iter()
            .filter(|e| e.key == OUTPUT_KEY)
            .flat_map(|e| match &e.value {
                ResolvedValue::List(items) => items.iter().map(OutputProduct::from_value).collect(),
                single => vec![OutputProduct::from_value(single)],
            })
            .collect();
        Self {
            entries,
            outputs,
            output_dir,
            overrides,
        }
    }

    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn outputs(&self) -> &[OutputProduct] {
        &self.outputs
    }

    /// Value of the output-directory macro, when the template defined one.
    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// The document in source order.
    pub fn to_document(&self) -> Value {
        document(&self.entries)
    }
}

fn document(entries: &[ResolvedEntry]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|e| (e.key.clone(), e.value.to_json()))
            .collect::<Map<_, _>>(),
    )
}

/// Restart, spinup and year-range parameters of a validated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunControl {
    pub firstyear: i64,
    pub lastyear: i64,
    pub nspinup: i64,
    pub nspinyear: i64,
    pub restart: bool,
    pub restart_filename: Option<String>,
    pub write_restart: bool,
    pub write_restart_filename: Option<String>,
    pub restart_year: Option<i64>,
    pub outputyear: Option<i64>,
    pub checkpoint_filename: Option<String>,
}

impl RunControl {
    /// Extract the run-control fields; `None` when a required field is
    /// missing or mistyped.
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        let int = |key: &str| candidate.get(key).and_then(ResolvedValue::as_int);
        let flag = |key: &str| {
            candidate
                .get(key)
                .and_then(ResolvedValue::as_bool)
                .unwrap_or(false)
        };
        let text = |key: &str| {
            candidate
                .get(key)
                .and_then(ResolvedValue::as_text)
                .map(str::to_string)
        };
        Some(Self {
            firstyear: int("firstyear")?,
            lastyear: int("lastyear")?,
            nspinup: int("nspinup")?,
            nspinyear: int("nspinyear")?,
            restart: flag("restart"),
            restart_filename: text("restart_filename"),
            write_restart: flag("write_restart"),
            write_restart_filename: text("write_restart_filename"),
            restart_year: int("restart_year"),
            outputyear: int("outputyear"),
            checkpoint_filename: text("checkpoint_filename"),
        })
    }
}

/// The final, validated run descriptor. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    entries: Vec<ResolvedEntry>,
    outputs: Vec<OutputProduct>,
    output_dir: Option<String>,
    run: RunControl,
}

impl Manifest {
    pub(crate) fn new(candidate: Candidate, run: RunControl) -> Self {
        Self {
            entries: candidate.entries,
            outputs: candidate.outputs,
            output_dir: candidate.output_dir,
            run,
        }
    }

    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn outputs(&self) -> &[OutputProduct] {
        &self.outputs
    }

    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    pub fn run(&self) -> &RunControl {
        &self.run
    }

    pub fn firstyear(&self) -> i64 {
        self.run.firstyear
    }

    pub fn lastyear(&self) -> i64 {
        self.run.lastyear
    }

    pub fn is_restart(&self) -> bool {
        self.run.restart
    }

    /// The document in source order, ready for serialization.
    pub fn to_document(&self) -> Value {
        document(&self.entries)
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.key, &entry.value)?;
        }
        map.end()
    }
}
