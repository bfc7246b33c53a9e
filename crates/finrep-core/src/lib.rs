//! Core domain model for financial report ingestion.
//!
//! Holds the report and statement-item types shared by every other crate, plus the
//! pure building blocks of the pipeline: period parsing, audit classification,
//! label cleanup, boundary validation and statement tree assembly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod label;
pub mod period;
pub mod tree;
pub mod validation;

pub use label::{classify_audit, clean_report_name, is_parent_company_label, normalize_symbol, AuditStatus};
pub use period::{parse_report_time, ParsedPeriod};
pub use tree::{build_statement_tree, StatementNode};
pub use validation::{validate_batch, validate_item, validate_report, Rejection, ValidationError};

pub const CRATE_NAME: &str = "finrep-core";

/// Storage-assigned identifier of a persisted report.
pub type ReportId = i64;

/// Storage-assigned identifier of a persisted statement item.
pub type ItemId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Annual,
    Quarterly,
}

impl ReportType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annual" => Ok(Self::Annual),
            "quarterly" => Ok(Self::Quarterly),
            other => Err(ValidationError::UnknownReportType(other.to_string())),
        }
    }
}

/// Report metadata exactly as the scraper hands it over. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawReport {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub report_name: Option<String>,
    pub report_time: Option<String>,
    pub report_url: Option<String>,
}

/// Output of the deduplicator: cleaned, classified, but not yet validated.
///
/// `report_type == None` marks a record whose period could not be classified; it is
/// kept so callers can reject it explicitly at the validation boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedReport {
    pub symbol: String,
    pub company_name: Option<String>,
    pub report_name: Option<String>,
    pub report_type: Option<ReportType>,
    pub report_year: Option<i32>,
    pub report_quarter: Option<u8>,
    pub is_audited: bool,
    pub is_reviewed: bool,
    pub report_url: Option<String>,
}

impl NormalizedReport {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            symbol: self.symbol.clone(),
            report_type: self.report_type,
            report_year: self.report_year,
            report_quarter: self.report_quarter,
        }
    }

    /// Audited beats reviewed beats neither; a report that is both scores highest.
    pub const fn priority(&self) -> u8 {
        (self.is_audited as u8) * 2 + (self.is_reviewed as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub symbol: String,
    pub report_type: Option<ReportType>,
    pub report_year: Option<i32>,
    pub report_quarter: Option<u8>,
}

/// A fiscal period that is known to be well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportPeriod {
    Annual { year: i32 },
    Quarterly { year: i32, quarter: u8 },
}

impl ReportPeriod {
    pub const fn report_type(&self) -> ReportType {
        match self {
            Self::Annual { .. } => ReportType::Annual,
            Self::Quarterly { .. } => ReportType::Quarterly,
        }
    }

    pub const fn year(&self) -> i32 {
        match self {
            Self::Annual { year } | Self::Quarterly { year, .. } => *year,
        }
    }

    pub const fn quarter(&self) -> Option<u8> {
        match self {
            Self::Annual { .. } => None,
            Self::Quarterly { quarter, .. } => Some(*quarter),
        }
    }

    /// Source-style period token, e.g. `Q3/2025` or `CN/2025`.
    pub fn token(&self) -> String {
        match self {
            Self::Annual { year } => format!("CN/{year}"),
            Self::Quarterly { year, quarter } => format!("Q{quarter}/{year}"),
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Uniqueness key of a stored report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub symbol: String,
    pub report_type: ReportType,
    pub report_year: i32,
    pub report_quarter: Option<u8>,
}

/// A normalized report that passed boundary validation.
///
/// Serializes with the same flat shape as [`NormalizedReport`]; deserializing runs
/// [`validate_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NormalizedReport", into = "NormalizedReport")]
pub struct ReportRecord {
    pub symbol: String,
    pub company_name: String,
    pub report_name: String,
    pub period: ReportPeriod,
    pub is_audited: bool,
    pub is_reviewed: bool,
    pub report_url: String,
}

impl ReportRecord {
    pub fn key(&self) -> ReportKey {
        ReportKey {
            symbol: self.symbol.clone(),
            report_type: self.period.report_type(),
            report_year: self.period.year(),
            report_quarter: self.period.quarter(),
        }
    }
}

impl TryFrom<NormalizedReport> for ReportRecord {
    type Error = ValidationError;

    fn try_from(value: NormalizedReport) -> Result<Self, Self::Error> {
        validate_report(&value)
    }
}

impl From<ReportRecord> for NormalizedReport {
    fn from(value: ReportRecord) -> Self {
        Self {
            symbol: value.symbol,
            company_name: Some(value.company_name),
            report_name: Some(value.report_name),
            report_type: Some(value.period.report_type()),
            report_year: Some(value.period.year()),
            report_quarter: value.period.quarter(),
            is_audited: value.is_audited,
            is_reviewed: value.is_reviewed,
            report_url: Some(value.report_url),
        }
    }
}

/// Persisted report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub id: ReportId,
    #[serde(flatten)]
    pub report: ReportRecord,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [Self; 3] = [Self::BalanceSheet, Self::IncomeStatement, Self::CashFlow];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_statement",
            Self::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an item value. Serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Sign {
    Positive,
    Negative,
}

impl TryFrom<i16> for Sign {
    type Error = ValidationError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Positive),
            -1 => Ok(Self::Negative),
            other => Err(ValidationError::InvalidSign(other)),
        }
    }
}

impl From<Sign> for i16 {
    fn from(value: Sign) -> Self {
        match value {
            Sign::Positive => 1,
            Sign::Negative => -1,
        }
    }
}

/// Flat statement line as supplied upstream. `parent_code` is an external code, not a
/// storage id; upstream payloads call it `parent_item_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementItemInput {
    pub item_name: String,
    #[serde(default)]
    pub item_code: Option<String>,
    pub item_value: i64,
    pub sign: Sign,
    pub level: u32,
    pub item_display: u32,
    #[serde(default, alias = "parent_item_id")]
    pub parent_code: Option<String>,
}

/// Storage-ready item: report attached, parent already resolved to a storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatementItem {
    pub report_id: ReportId,
    pub item_name: String,
    pub item_code: Option<String>,
    pub item_value: i64,
    pub sign: Sign,
    pub level: u32,
    pub item_display: u32,
    pub parent_id: Option<ItemId>,
}

impl NewStatementItem {
    pub fn from_input(input: &StatementItemInput, report_id: ReportId, parent_id: Option<ItemId>) -> Self {
        Self {
            report_id,
            item_name: input.item_name.clone(),
            item_code: input.item_code.clone(),
            item_value: input.item_value,
            sign: input.sign,
            level: input.level,
            item_display: input.item_display,
            parent_id,
        }
    }

    pub fn into_stored(self, id: ItemId, kind: StatementKind) -> StatementItem {
        StatementItem {
            id,
            report_id: self.report_id,
            kind,
            item_name: self.item_name,
            item_code: self.item_code,
            item_value: self.item_value,
            sign: self.sign,
            level: self.level,
            item_display: self.item_display,
            parent_id: self.parent_id,
        }
    }
}

/// Persisted statement item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementItem {
    pub id: ItemId,
    pub report_id: ReportId,
    pub kind: StatementKind,
    pub item_name: String,
    pub item_code: Option<String>,
    pub item_value: i64,
    pub sign: Sign,
    pub level: u32,
    pub item_display: u32,
    pub parent_id: Option<ItemId>,
}

/// The three flat item lists that accompany one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementBatch {
    pub balance_sheet: Vec<StatementItemInput>,
    pub income_statement: Vec<StatementItemInput>,
    pub cash_flow: Vec<StatementItemInput>,
}

impl StatementBatch {
    pub fn items(&self, kind: StatementKind) -> &[StatementItemInput] {
        match kind {
            StatementKind::BalanceSheet => &self.balance_sheet,
            StatementKind::IncomeStatement => &self.income_statement,
            StatementKind::CashFlow => &self.cash_flow,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub balance_sheet: usize,
    pub income_statement: usize,
    pub cash_flow: usize,
}

impl ItemCounts {
    pub fn get(&self, kind: StatementKind) -> usize {
        match kind {
            StatementKind::BalanceSheet => self.balance_sheet,
            StatementKind::IncomeStatement => self.income_statement,
            StatementKind::CashFlow => self.cash_flow,
        }
    }

    pub fn set(&mut self, kind: StatementKind, count: usize) {
        match kind {
            StatementKind::BalanceSheet => self.balance_sheet = count,
            StatementKind::IncomeStatement => self.income_statement = count,
            StatementKind::CashFlow => self.cash_flow = count,
        }
    }

    pub fn total(&self) -> usize {
        self.balance_sheet + self.income_statement + self.cash_flow
    }
}
