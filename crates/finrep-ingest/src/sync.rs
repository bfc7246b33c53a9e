//! Report metadata sync: fetch listings per symbol, deduplicate, validate, upsert.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use finrep_adapters::ReportSource;
use finrep_core::{normalize_symbol, validate_batch, NormalizedReport, Rejection, StatementBatch};
use serde::Serialize;
use tracing::{info, warn};

use crate::coordinator::IngestionCoordinator;
use crate::dedup::deduplicate;
use crate::IngestError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
}

impl SyncSummary {
    pub fn absorb(&mut self, other: &SyncSummary) {
        self.total += other.total;
        self.created += other.created;
        self.updated += other.updated;
        self.rejected += other.rejected;
        self.rejections.extend(other.rejections.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub summary: Option<SyncSummary>,
    pub error: Option<String>,
}

impl SymbolOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: SyncSummary,
    pub failed_symbols: usize,
    pub symbols: Vec<SymbolOutcome>,
}

/// Validate `reports` and upsert the survivors, metadata only. Each report commits on its
/// own; a store failure stops the batch.
pub async fn sync_reports(
    coordinator: &IngestionCoordinator,
    reports: Vec<NormalizedReport>,
) -> Result<SyncSummary, IngestError> {
    let total = reports.len();
    let (records, rejections) = validate_batch(reports);
    let mut summary = SyncSummary {
        total,
        rejected: rejections.len(),
        rejections,
        ..SyncSummary::default()
    };

    let empty = StatementBatch::default();
    for record in &records {
        let outcome = coordinator.ingest(record, &empty).await?;
        if outcome.created {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
    }
    Ok(summary)
}

/// Trimmed, uppercased, blank-free, first occurrence wins.
pub fn distinct_symbols<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|symbol| normalize_symbol(Some(symbol.as_ref())))
        .filter(|symbol| !symbol.is_empty() && seen.insert(symbol.clone()))
        .collect()
}

/// Sync every distinct symbol. A failing symbol is recorded and the rest still run.
pub async fn sync_symbols<S: AsRef<str>>(
    source: &dyn ReportSource,
    coordinator: &IngestionCoordinator,
    symbols: &[S],
) -> Vec<SymbolOutcome> {
    let mut outcomes = Vec::new();
    for symbol in distinct_symbols(symbols) {
        let result = match source.fetch_reports(&symbol).await {
            Ok(raw) => sync_reports(coordinator, deduplicate(raw))
                .await
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match result {
            Ok(summary) => {
                info!(
                    %symbol,
                    created = summary.created,
                    updated = summary.updated,
                    rejected = summary.rejected,
                    "symbol synced"
                );
                outcomes.push(SymbolOutcome {
                    symbol,
                    summary: Some(summary),
                    error: None,
                });
            }
            Err(error) => {
                warn!(%symbol, %error, "symbol sync failed");
                outcomes.push(SymbolOutcome {
                    symbol,
                    summary: None,
                    error: Some(error),
                });
            }
        }
    }
    outcomes
}

pub struct SyncPipeline {
    source: Arc<dyn ReportSource>,
    coordinator: IngestionCoordinator,
}

impl SyncPipeline {
    pub fn new(source: Arc<dyn ReportSource>, coordinator: IngestionCoordinator) -> Self {
        Self { source, coordinator }
    }

    pub async fn run_once<S: AsRef<str>>(&self, symbols: &[S]) -> SyncRunSummary {
        let started_at = Utc::now();
        let outcomes = sync_symbols(self.source.as_ref(), &self.coordinator, symbols).await;

        let mut totals = SyncSummary::default();
        for summary in outcomes.iter().filter_map(|outcome| outcome.summary.as_ref()) {
            totals.absorb(summary);
        }
        let failed_symbols = outcomes.iter().filter(|outcome| !outcome.is_success()).count();

        SyncRunSummary {
            source_id: self.source.source_id().to_string(),
            started_at,
            finished_at: Utc::now(),
            totals,
            failed_symbols,
            symbols: outcomes,
        }
    }
}
