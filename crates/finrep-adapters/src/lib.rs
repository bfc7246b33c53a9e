//! Report source contracts + fixture-first source implementation.
//!
//! A source hands over raw, unvalidated report metadata for one symbol. Statement
//! payloads arrive separately as [`StatementBundle`] files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use finrep_core::{normalize_symbol, NormalizedReport, RawReport, StatementBatch};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "finrep-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no report bundle for symbol {symbol} at {}", .path.display())]
    UnknownSymbol { symbol: String, path: PathBuf },
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait ReportSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// Raw report listings for one symbol, in source order.
    async fn fetch_reports(&self, symbol: &str) -> Result<Vec<RawReport>, AdapterError>;
}

/// One scrape of a symbol's report listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub source_id: String,
    pub symbol: String,
    #[serde(default)]
    pub captured_from_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub reports: Vec<RawReport>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A report together with the flat statement lists parsed from its document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementBundle {
    pub report: NormalizedReport,
    #[serde(default)]
    pub statements: StatementBatch,
}

pub fn load_report_bundle(path: impl AsRef<Path>) -> Result<ReportBundle> {
    read_json_file(path)
}

pub fn load_raw_reports(path: impl AsRef<Path>) -> Result<Vec<RawReport>> {
    let path = path.as_ref();
    let value: serde_json::Value = read_json_file(path)?;
    // Accept either a bare array or a full bundle.
    if value.is_array() {
        return serde_json::from_value(value).with_context(|| format!("parsing reports in {}", path.display()));
    }
    let bundle: ReportBundle =
        serde_json::from_value(value).with_context(|| format!("parsing report bundle {}", path.display()))?;
    Ok(bundle.reports)
}

pub fn load_statement_bundle(path: impl AsRef<Path>) -> Result<StatementBundle> {
    read_json_file(path)
}

/// Every `*.json` file directly under `dir`, sorted by file name.
pub fn statement_bundle_paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry.with_context(|| format!("reading entry in {}", dir.display()))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Reads `<root>/<source_id>/<SYMBOL>.json` report bundles.
#[derive(Debug, Clone)]
pub struct FixtureReportSource {
    source_id: String,
    root: PathBuf,
}

impl FixtureReportSource {
    pub fn new(source_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            root: root.into(),
        }
    }

    pub fn bundle_path_for(&self, symbol: &str) -> PathBuf {
        self.root
            .join(&self.source_id)
            .join(format!("{}.json", normalize_symbol(Some(symbol))))
    }
}

#[async_trait]
impl ReportSource for FixtureReportSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_reports(&self, symbol: &str) -> Result<Vec<RawReport>, AdapterError> {
        let path = self.bundle_path_for(symbol);
        if !path.exists() {
            return Err(AdapterError::UnknownSymbol {
                symbol: symbol.to_string(),
                path,
            });
        }
        let bundle = load_report_bundle(&path)?;
        if bundle.source_id != self.source_id {
            return Err(AdapterError::Message(format!(
                "bundle {} belongs to source {}, expected {}",
                path.display(),
                bundle.source_id,
                self.source_id
            )));
        }
        debug!(
            source_id = %self.source_id,
            symbol,
            reports = bundle.reports.len(),
            fetched_at = %bundle.fetched_at,
            "loaded report bundle"
        );
        Ok(bundle.reports)
    }
}
