//! Declarative bucket sources: YAML and CSV
//!
//! Both formats carry the same flat records (`label`, `optimal_ratio`,
//! `current_value`, `amount_to_add`, `children`) and normalize to the same
//! list of [`BucketSpec`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{split_children, BucketSpec};

pub const COLUMNS: [&str; 5] = [
    "label",
    "optimal_ratio",
    "current_value",
    "amount_to_add",
    "children",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Csv,
}

impl Format {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> ApplicationResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "csv" => Ok(Format::Csv),
            other => Err(ApplicationError::load(
                path.display().to_string(),
                format!("unknown input extension '{}', expected .yaml, .yml or .csv", other),
            )),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => f.write_str("yaml"),
            Format::Csv => f.write_str("csv"),
        }
    }
}

/// Parse `content` in the given format.
pub fn load_str(content: &str, format: Format) -> ApplicationResult<Vec<BucketSpec>> {
    load_source(content, format, &format!("{} input", format))
}

/// Like [`load_str`], naming `source_name` in errors.
pub fn load_source(
    content: &str,
    format: Format,
    source_name: &str,
) -> ApplicationResult<Vec<BucketSpec>> {
    let specs = match format {
        Format::Yaml => parse_yaml(content, source_name)?,
        Format::Csv => parse_csv(content, source_name)?,
    };
    debug!("loaded {} records from {}", specs.len(), source_name);
    Ok(specs)
}

fn warn_unknown_columns<'a>(columns: impl IntoIterator<Item = &'a str>, source_name: &str) {
    let unknown: BTreeSet<&str> = columns
        .into_iter()
        .filter(|c| !COLUMNS.contains(c))
        .collect();
    for column in unknown {
        warn!("unknown column in {}: {}", source_name, column);
    }
}

// YAML

/// Labels may be written as bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Label {
    Text(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Text(s) => f.write_str(s),
            Label::Int(i) => write!(f, "{}", i),
            Label::Float(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Children {
    Joined(String),
    List(Vec<Label>),
}

#[derive(Debug, Deserialize)]
struct YamlRecord {
    label: Label,
    #[serde(default)]
    optimal_ratio: f64,
    #[serde(default)]
    current_value: f64,
    #[serde(default)]
    amount_to_add: f64,
    #[serde(default)]
    children: Option<Children>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

impl From<YamlRecord> for BucketSpec {
    fn from(record: YamlRecord) -> Self {
        let children = match record.children {
            None => Vec::new(),
            Some(Children::Joined(s)) => split_children(&s),
            Some(Children::List(list)) => list
                .iter()
                .map(|l| l.to_string().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        BucketSpec {
            label: record.label.to_string().trim().to_string(),
            current_value: record.current_value,
            optimal_ratio: record.optimal_ratio,
            amount_to_add: record.amount_to_add,
            children,
        }
    }
}

fn parse_yaml(content: &str, source_name: &str) -> ApplicationResult<Vec<BucketSpec>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<YamlRecord> =
        serde_yaml::from_str(content).map_err(|e| ApplicationError::load(source_name, e))?;
    warn_unknown_columns(
        records.iter().flat_map(|r| r.extra.keys().map(String::as_str)),
        source_name,
    );
    Ok(records.into_iter().map(BucketSpec::from).collect())
}

// CSV

fn parse_amount(raw: Option<&str>, column: &str, line: u64) -> Result<f64, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0.0),
        Some(value) => value
            .parse::<f64>()
            .map_err(|e| format!("line {}: {} '{}': {}", line, column, value, e)),
    }
}

fn parse_csv(content: &str, source_name: &str) -> ApplicationResult<Vec<BucketSpec>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ApplicationError::load(source_name, e))?
        .clone();
    warn_unknown_columns(headers.iter(), source_name);
    let column = |name: &str| headers.iter().position(|h| h == name);
    let label_col = column("label")
        .ok_or_else(|| ApplicationError::load(source_name, "missing column 'label'"))?;
    let ratio_col = column("optimal_ratio");
    let current_col = column("current_value");
    let pool_col = column("amount_to_add");
    let children_col = column("children");

    let mut specs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ApplicationError::load(source_name, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |col: Option<usize>| col.and_then(|c| record.get(c));
        let amount = |col: Option<usize>, name: &str| {
            parse_amount(field(col), name, line).map_err(|e| ApplicationError::load(source_name, e))
        };

        let label = field(Some(label_col)).unwrap_or_default().to_string();
        if label.is_empty() && record.iter().all(str::is_empty) {
            continue;
        }
        specs.push(BucketSpec {
            label,
            optimal_ratio: amount(ratio_col, "optimal_ratio")?,
            current_value: amount(current_col, "current_value")?,
            amount_to_add: amount(pool_col, "amount_to_add")?,
            children: field(children_col).map(split_children).unwrap_or_default(),
        });
    }
    Ok(specs)
}
