#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use finrep_core::{
    FinancialReport, ItemId, NewStatementItem, ReportId, ReportKey, ReportPeriod, ReportRecord, Sign, StatementItem,
    StatementItemInput, StatementKind,
};
use finrep_storage::{LedgerStore, LedgerTx, MemoryLedgerStore, ReportFilter, StoreError, StoreResult};

pub const INJECTED: &str = "injected insert failure";

pub fn record(symbol: &str, period: ReportPeriod) -> ReportRecord {
    ReportRecord {
        symbol: symbol.into(),
        company_name: format!("{symbol} corp"),
        report_name: format!("Báo cáo tài chính {period}"),
        period,
        is_audited: false,
        is_reviewed: false,
        report_url: format!("https://example.test/{symbol}/{}.pdf", period.token().replace('/', "-")),
    }
}

pub fn annual(symbol: &str, year: i32) -> ReportRecord {
    record(symbol, ReportPeriod::Annual { year })
}

pub fn line(code: &str, parent: Option<&str>, display: u32) -> StatementItemInput {
    StatementItemInput {
        item_name: format!("line {code}"),
        item_code: Some(code.into()),
        item_value: 1_000 * i64::from(display),
        sign: Sign::Positive,
        level: if parent.is_some() { 2 } else { 1 },
        item_display: display,
        parent_code: parent.map(str::to_string),
    }
}

/// Memory store whose transactions fail every insert of one statement kind.
pub struct FailingLedgerStore {
    inner: MemoryLedgerStore,
    fail_kind: StatementKind,
}

impl FailingLedgerStore {
    pub fn new(inner: MemoryLedgerStore, fail_kind: StatementKind) -> Arc<Self> {
        Arc::new(Self { inner, fail_kind })
    }
}

struct FailingTx {
    inner: Box<dyn LedgerTx>,
    fail_kind: StatementKind,
}

#[async_trait]
impl LedgerTx for FailingTx {
    async fn find_report(&mut self, key: &ReportKey) -> StoreResult<Option<ReportId>> {
        self.inner.find_report(key).await
    }

    async fn insert_report(&mut self, report: &ReportRecord) -> StoreResult<ReportId> {
        self.inner.insert_report(report).await
    }

    async fn update_report(&mut self, id: ReportId, report: &ReportRecord) -> StoreResult<()> {
        self.inner.update_report(id, report).await
    }

    async fn insert_item(&mut self, kind: StatementKind, item: &NewStatementItem) -> StoreResult<ItemId> {
        if kind == self.fail_kind {
            return Err(StoreError::Conflict(INJECTED.to_string()));
        }
        self.inner.insert_item(kind, item).await
    }

    async fn delete_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        self.inner.delete_items(report_id, kind).await
    }

    async fn count_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        self.inner.count_items(report_id, kind).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl LedgerStore for FailingLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingTx {
            inner,
            fail_kind: self.fail_kind,
        }))
    }

    async fn report(&self, id: ReportId) -> StoreResult<Option<FinancialReport>> {
        self.inner.report(id).await
    }

    async fn reports(&self, filter: &ReportFilter) -> StoreResult<Vec<FinancialReport>> {
        self.inner.reports(filter).await
    }

    async fn items(&self, report_id: ReportId, kind: StatementKind) -> StoreResult<Vec<StatementItem>> {
        self.inner.items(report_id, kind).await
    }

    async fn delete_report(&self, id: ReportId) -> StoreResult<bool> {
        self.inner.delete_report(id).await
    }

    async fn delete_reports_by_symbol(&self, symbol: &str) -> StoreResult<u64> {
        self.inner.delete_reports_by_symbol(symbol).await
    }

    async fn count_reports(&self, symbol: Option<&str>) -> StoreResult<u64> {
        self.inner.count_reports(symbol).await
    }
}
