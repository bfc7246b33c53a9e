//! Persistence for financial reports and their statement items.
//!
//! Writes go through a [`LedgerTx`] obtained from [`LedgerStore::begin`]; nothing is
//! visible to other readers until [`LedgerTx::commit`]. Reads run outside any
//! transaction.

use async_trait::async_trait;
use finrep_core::{
    normalize_symbol, FinancialReport, ItemId, NewStatementItem, ReportId, ReportKey, ReportRecord, ReportType,
    StatementItem, StatementKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::{connect, PgLedgerStore};

pub const CRATE_NAME: &str = "finrep-storage";

pub const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query parameters for [`LedgerStore::reports`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub symbol: Option<String>,
    pub report_type: Option<ReportType>,
    pub report_year: Option<i32>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            symbol: None,
            report_type: None,
            report_year: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl ReportFilter {
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::default()
        }
    }

    /// The symbol as stored: trimmed and uppercased.
    pub(crate) fn symbol_key(&self) -> Option<String> {
        self.symbol.as_deref().map(|symbol| normalize_symbol(Some(symbol)))
    }

    pub(crate) fn matches(&self, report: &ReportRecord) -> bool {
        self.symbol_key().is_none_or(|symbol| report.symbol == symbol)
            && self.report_type.is_none_or(|ty| report.period.report_type() == ty)
            && self.report_year.is_none_or(|year| report.period.year() == year)
    }
}

/// Write side of the ledger. Dropping a transaction without committing discards it.
#[async_trait]
pub trait LedgerTx: Send {
    async fn find_report(&mut self, key: &ReportKey) -> StoreResult<Option<ReportId>>;
    async fn insert_report(&mut self, report: &ReportRecord) -> StoreResult<ReportId>;
    /// Overwrite every field except the id.
    async fn update_report(&mut self, id: ReportId, report: &ReportRecord) -> StoreResult<()>;
    async fn insert_item(&mut self, kind: StatementKind, item: &NewStatementItem) -> StoreResult<ItemId>;
    async fn delete_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64>;
    async fn count_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
    async fn report(&self, id: ReportId) -> StoreResult<Option<FinancialReport>>;
    /// Ordered by symbol asc, year desc, quarter asc.
    async fn reports(&self, filter: &ReportFilter) -> StoreResult<Vec<FinancialReport>>;
    /// Ordered by `item_display`, then id.
    async fn items(&self, report_id: ReportId, kind: StatementKind) -> StoreResult<Vec<StatementItem>>;
    async fn delete_report(&self, id: ReportId) -> StoreResult<bool>;
    async fn delete_reports_by_symbol(&self, symbol: &str) -> StoreResult<u64>;
    async fn count_reports(&self, symbol: Option<&str>) -> StoreResult<u64>;
}

pub(crate) fn period_order(a: &ReportRecord, b: &ReportRecord) -> std::cmp::Ordering {
    a.symbol
        .cmp(&b.symbol)
        .then_with(|| b.period.year().cmp(&a.period.year()))
        .then_with(|| match (a.period.quarter(), b.period.quarter()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
}
