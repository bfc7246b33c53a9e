//! In-process ledger used by tests and `--dry-run` ingestion.
//!
//! A transaction holds the state lock until it commits or is dropped, so transactions
//! are fully serialized. Writes are staged on a copy and only swapped in on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use finrep_core::{
    normalize_symbol, FinancialReport, ItemId, NewStatementItem, ReportId, ReportKey, ReportRecord, StatementItem,
    StatementKind,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{period_order, LedgerStore, LedgerTx, ReportFilter, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_report_id: ReportId,
    last_item_id: ItemId,
    reports: BTreeMap<ReportId, FinancialReport>,
    items: BTreeMap<ItemId, StatementItem>,
}

impl MemoryState {
    fn report_with_key(&self, key: &ReportKey) -> Option<ReportId> {
        self.reports
            .values()
            .find(|stored| stored.report.key() == *key)
            .map(|stored| stored.id)
    }

    fn remove_report(&mut self, id: ReportId) -> bool {
        if self.reports.remove(&id).is_none() {
            return false;
        }
        self.items.retain(|_, item| item.report_id != id);
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn find_report(&mut self, key: &ReportKey) -> StoreResult<Option<ReportId>> {
        Ok(self.staged.report_with_key(key))
    }

    async fn insert_report(&mut self, report: &ReportRecord) -> StoreResult<ReportId> {
        let key = report.key();
        if let Some(existing) = self.staged.report_with_key(&key) {
            return Err(StoreError::Conflict(format!(
                "report {} {} already stored as {existing}",
                key.symbol, report.period
            )));
        }
        self.staged.last_report_id += 1;
        let id = self.staged.last_report_id;
        self.staged.reports.insert(
            id,
            FinancialReport {
                id,
                report: report.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_report(&mut self, id: ReportId, report: &ReportRecord) -> StoreResult<()> {
        if let Some(other) = self.staged.report_with_key(&report.key()) {
            if other != id {
                return Err(StoreError::Conflict(format!(
                    "report {} {} already stored as {other}",
                    report.symbol, report.period
                )));
            }
        }
        let stored = self
            .staged
            .reports
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "report", id })?;
        stored.report = report.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_item(&mut self, kind: StatementKind, item: &NewStatementItem) -> StoreResult<ItemId> {
        if !self.staged.reports.contains_key(&item.report_id) {
            return Err(StoreError::NotFound {
                entity: "report",
                id: item.report_id,
            });
        }
        if let Some(parent_id) = item.parent_id {
            let parent_ok = self
                .staged
                .items
                .get(&parent_id)
                .is_some_and(|parent| parent.kind == kind && parent.report_id == item.report_id);
            if !parent_ok {
                return Err(StoreError::NotFound {
                    entity: "parent item",
                    id: parent_id,
                });
            }
        }
        self.staged.last_item_id += 1;
        let id = self.staged.last_item_id;
        self.staged.items.insert(id, item.clone().into_stored(id, kind));
        Ok(id)
    }

    async fn delete_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        let before = self.staged.items.len();
        self.staged
            .items
            .retain(|_, item| !(item.report_id == report_id && item.kind == kind));
        Ok((before - self.staged.items.len()) as u64)
    }

    async fn count_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        Ok(self
            .staged
            .items
            .values()
            .filter(|item| item.report_id == report_id && item.kind == kind)
            .count() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, staged } = *self;
        debug!(reports = staged.reports.len(), items = staged.items.len(), "memory ledger commit");
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!("memory ledger rollback");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn report(&self, id: ReportId) -> StoreResult<Option<FinancialReport>> {
        Ok(self.state.lock().await.reports.get(&id).cloned())
    }

    async fn reports(&self, filter: &ReportFilter) -> StoreResult<Vec<FinancialReport>> {
        let state = self.state.lock().await;
        let mut matching: Vec<FinancialReport> = state
            .reports
            .values()
            .filter(|stored| filter.matches(&stored.report))
            .cloned()
            .collect();
        matching.sort_by(|a, b| period_order(&a.report, &b.report).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn items(&self, report_id: ReportId, kind: StatementKind) -> StoreResult<Vec<StatementItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<StatementItem> = state
            .items
            .values()
            .filter(|item| item.report_id == report_id && item.kind == kind)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.item_display, item.id));
        Ok(items)
    }

    async fn delete_report(&self, id: ReportId) -> StoreResult<bool> {
        Ok(self.state.lock().await.remove_report(id))
    }

    async fn delete_reports_by_symbol(&self, symbol: &str) -> StoreResult<u64> {
        let symbol = normalize_symbol(Some(symbol));
        let mut state = self.state.lock().await;
        let ids: Vec<ReportId> = state
            .reports
            .values()
            .filter(|stored| stored.report.symbol == symbol)
            .map(|stored| stored.id)
            .collect();
        for id in &ids {
            state.remove_report(*id);
        }
        Ok(ids.len() as u64)
    }

    async fn count_reports(&self, symbol: Option<&str>) -> StoreResult<u64> {
        let state = self.state.lock().await;
        let count = match symbol.map(|s| normalize_symbol(Some(s))) {
            Some(symbol) => state
                .reports
                .values()
                .filter(|stored| stored.report.symbol == symbol)
                .count(),
            None => state.reports.len(),
        };
        Ok(count as u64)
    }
}
