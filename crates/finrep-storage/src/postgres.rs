//! PostgreSQL ledger on `sqlx`. Each statement kind lives in its own table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use finrep_core::{
    normalize_symbol, FinancialReport, ItemId, NewStatementItem, ReportId, ReportKey, ReportPeriod, ReportRecord,
    ReportType, Sign, StatementItem, StatementKind,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, info_span, Instrument};

use crate::{LedgerStore, LedgerTx, ReportFilter, StoreError, StoreResult};

const REPORT_COLUMNS: &str = "id, symbol, company_name, report_name, report_type, report_year, report_quarter, \
     is_audited, is_reviewed, report_url, updated_at";

const ITEM_COLUMNS: &str = "id, report_id, item_name, item_code, item_value, sign, level, item_display, parent_id";

pub fn item_table(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::BalanceSheet => "balance_sheet_items",
        StatementKind::IncomeStatement => "income_statement_items",
        StatementKind::CashFlow => "cash_flow_statement_items",
    }
}

/// Open a pool against `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: i64,
    symbol: String,
    company_name: String,
    report_name: String,
    report_type: String,
    report_year: i32,
    report_quarter: Option<i16>,
    is_audited: bool,
    is_reviewed: bool,
    report_url: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for FinancialReport {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let report_type: ReportType = row
            .report_type
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("report {}: {err}", row.id)))?;
        let period = match (report_type, row.report_quarter) {
            (ReportType::Annual, None) => ReportPeriod::Annual { year: row.report_year },
            (ReportType::Quarterly, Some(quarter @ 1..=4)) => ReportPeriod::Quarterly {
                year: row.report_year,
                quarter: quarter as u8,
            },
            (_, quarter) => {
                return Err(StoreError::Corrupt(format!(
                    "report {} has {report_type} type with quarter {quarter:?}",
                    row.id
                )))
            }
        };
        Ok(Self {
            id: row.id,
            report: ReportRecord {
                symbol: row.symbol,
                company_name: row.company_name,
                report_name: row.report_name,
                period,
                is_audited: row.is_audited,
                is_reviewed: row.is_reviewed,
                report_url: row.report_url,
            },
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    report_id: i64,
    item_name: String,
    item_code: Option<String>,
    item_value: i64,
    sign: i16,
    level: i32,
    item_display: i32,
    parent_id: Option<i64>,
}

impl ItemRow {
    fn into_item(self, kind: StatementKind) -> StoreResult<StatementItem> {
        let id = self.id;
        let corrupt = |what: &str| StoreError::Corrupt(format!("{kind} item {id}: {what}"));
        let sign = Sign::try_from(self.sign).map_err(|err| corrupt(&err.to_string()))?;
        let level = u32::try_from(self.level).map_err(|_| corrupt("negative level"))?;
        let item_display = u32::try_from(self.item_display).map_err(|_| corrupt("negative item_display"))?;
        Ok(StatementItem {
            id: self.id,
            report_id: self.report_id,
            kind,
            item_name: self.item_name,
            item_code: self.item_code,
            item_value: self.item_value,
            sign,
            level,
            item_display,
            parent_id: self.parent_id,
        })
    }
}

fn to_i32(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} {value} does not fit the column")))
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
        _ => StoreError::Database(err),
    }
}

/// The composite `(parent_id, report_id)` key, as named by Postgres for each item table.
fn is_parent_constraint(constraint: &str) -> bool {
    constraint.ends_with("_parent_id_report_id_fkey")
}

fn map_item_error(err: sqlx::Error, parent_id: Option<ItemId>) -> StoreError {
    let missing_parent = matches!(
        &err,
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation() && db.constraint().is_some_and(is_parent_constraint)
    );
    match parent_id {
        Some(id) if missing_parent => StoreError::NotFound {
            entity: "parent item",
            id,
        },
        _ => map_write_error(err),
    }
}

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .instrument(info_span!("ledger_migrate"))
            .await?;
        info!("ledger migrations applied");
        Ok(())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn find_report(&mut self, key: &ReportKey) -> StoreResult<Option<ReportId>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM financial_reports \
             WHERE symbol = $1 AND report_type = $2 AND report_year = $3 \
             AND report_quarter IS NOT DISTINCT FROM $4",
        )
        .bind(&key.symbol)
        .bind(key.report_type.as_str())
        .bind(key.report_year)
        .bind(key.report_quarter.map(i16::from))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn insert_report(&mut self, report: &ReportRecord) -> StoreResult<ReportId> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO financial_reports \
             (symbol, company_name, report_name, report_type, report_year, report_quarter, \
              is_audited, is_reviewed, report_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(&report.symbol)
        .bind(&report.company_name)
        .bind(&report.report_name)
        .bind(report.period.report_type().as_str())
        .bind(report.period.year())
        .bind(report.period.quarter().map(i16::from))
        .bind(report.is_audited)
        .bind(report.is_reviewed)
        .bind(&report.report_url)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        debug!(id, symbol = %report.symbol, period = %report.period, "inserted report");
        Ok(id)
    }

    async fn update_report(&mut self, id: ReportId, report: &ReportRecord) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE financial_reports SET \
             symbol = $2, company_name = $3, report_name = $4, report_type = $5, report_year = $6, \
             report_quarter = $7, is_audited = $8, is_reviewed = $9, report_url = $10, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&report.symbol)
        .bind(&report.company_name)
        .bind(&report.report_name)
        .bind(report.period.report_type().as_str())
        .bind(report.period.year())
        .bind(report.period.quarter().map(i16::from))
        .bind(report.is_audited)
        .bind(report.is_reviewed)
        .bind(&report.report_url)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "report", id });
        }
        debug!(id, symbol = %report.symbol, period = %report.period, "updated report");
        Ok(())
    }

    async fn insert_item(&mut self, kind: StatementKind, item: &NewStatementItem) -> StoreResult<ItemId> {
        let sql = format!(
            "INSERT INTO {} (report_id, item_name, item_code, item_value, sign, level, item_display, parent_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            item_table(kind)
        );
        let id = sqlx::query_scalar::<_, i64>(&sql)
            .bind(item.report_id)
            .bind(&item.item_name)
            .bind(&item.item_code)
            .bind(item.item_value)
            .bind(i16::from(item.sign))
            .bind(to_i32(item.level, "level")?)
            .bind(to_i32(item.item_display, "item_display")?)
            .bind(item.parent_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|err| map_item_error(err, item.parent_id))?;
        Ok(id)
    }

    async fn delete_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE report_id = $1", item_table(kind));
        let result = sqlx::query(&sql).bind(report_id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn count_items(&mut self, report_id: ReportId, kind: StatementKind) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE report_id = $1", item_table(kind));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(report_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn report(&self, id: ReportId) -> StoreResult<Option<FinancialReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM financial_reports WHERE id = $1");
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(FinancialReport::try_from).transpose()
    }

    async fn reports(&self, filter: &ReportFilter) -> StoreResult<Vec<FinancialReport>> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {REPORT_COLUMNS} FROM financial_reports WHERE TRUE"));
        if let Some(symbol) = filter.symbol_key() {
            query.push(" AND symbol = ").push_bind(symbol);
        }
        if let Some(report_type) = filter.report_type {
            query.push(" AND report_type = ").push_bind(report_type.as_str());
        }
        if let Some(year) = filter.report_year {
            query.push(" AND report_year = ").push_bind(year);
        }
        query
            .push(" ORDER BY symbol ASC, report_year DESC, report_quarter ASC NULLS LAST, id ASC LIMIT ")
            .push_bind(filter.limit.max(0))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));

        let rows = query.build_query_as::<ReportRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(FinancialReport::try_from).collect()
    }

    async fn items(&self, report_id: ReportId, kind: StatementKind) -> StoreResult<Vec<StatementItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM {} WHERE report_id = $1 ORDER BY item_display ASC, id ASC",
            item_table(kind)
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(report_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|row| row.into_item(kind)).collect()
    }

    async fn delete_report(&self, id: ReportId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM financial_reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_reports_by_symbol(&self, symbol: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM financial_reports WHERE symbol = $1")
            .bind(normalize_symbol(Some(symbol)))
            .execute(&self.pool)
            .await?;
        info!(symbol, deleted = result.rows_affected(), "deleted reports by symbol");
        Ok(result.rows_affected())
    }

    async fn count_reports(&self, symbol: Option<&str>) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM financial_reports WHERE $1::TEXT IS NULL OR symbol = $1",
        )
        .bind(symbol.map(|s| normalize_symbol(Some(s))))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
