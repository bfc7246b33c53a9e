//! One report plus its three statements, written in a single transaction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use finrep_core::{validate_item, ItemCounts, ReportId, ReportRecord, StatementBatch, StatementKind};
use finrep_storage::{LedgerStore, LedgerTx};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};

use crate::resolver::HierarchyResolver;
use crate::IngestError;

/// What to do with items already stored for a report that is ingested again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReingestPolicy {
    /// Drop stored items of every kind that arrives non-empty.
    #[default]
    Replace,
    /// Keep stored items and add the new ones.
    Append,
    /// Fail if any supplied kind already has stored items.
    Reject,
}

impl ReingestPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ReingestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReingestPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            "reject" => Ok(Self::Reject),
            other => Err(IngestError::UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub report_id: ReportId,
    /// `false` when an existing report with the same period key was overwritten.
    pub created: bool,
    pub counts: ItemCounts,
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    store: Arc<dyn LedgerStore>,
    policy: ReingestPolicy,
}

impl fmt::Debug for IngestionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            policy: ReingestPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReingestPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upsert `report` and insert every statement item, all or nothing.
    ///
    /// Each kind is resolved with its own empty code map. On any failure the
    /// transaction is rolled back and the original error is returned.
    pub async fn ingest(&self, report: &ReportRecord, batch: &StatementBatch) -> Result<IngestOutcome, IngestError> {
        for kind in StatementKind::ALL {
            for (index, item) in batch.items(kind).iter().enumerate() {
                validate_item(item).map_err(|source| IngestError::InvalidItem { kind, index, source })?;
            }
        }

        let span = info_span!("ingest_report", symbol = %report.symbol, period = %report.period);
        self.ingest_in_tx(report, batch).instrument(span).await
    }

    async fn ingest_in_tx(&self, report: &ReportRecord, batch: &StatementBatch) -> Result<IngestOutcome, IngestError> {
        let mut tx = self.store.begin().await?;
        let written = self.write(tx.as_mut(), report, batch).await;
        match written {
            Ok(outcome) => {
                tx.commit().await?;
                info!(
                    report_id = outcome.report_id,
                    created = outcome.created,
                    items = outcome.counts.total(),
                    "report ingested"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                warn!(error = %err, "report ingestion rolled back");
                Err(err)
            }
        }
    }

    async fn write(
        &self,
        tx: &mut dyn LedgerTx,
        report: &ReportRecord,
        batch: &StatementBatch,
    ) -> Result<IngestOutcome, IngestError> {
        let (report_id, created) = match tx.find_report(&report.key()).await? {
            Some(id) => {
                tx.update_report(id, report).await?;
                (id, false)
            }
            None => (tx.insert_report(report).await?, true),
        };

        if !created {
            self.apply_policy(tx, report_id, batch).await?;
        }

        let mut counts = ItemCounts::default();
        for kind in StatementKind::ALL {
            let items = batch.items(kind);
            if items.is_empty() {
                continue;
            }
            let stored = HierarchyResolver::new(kind).resolve(tx, report_id, items).await?;
            counts.set(kind, stored.len());
        }

        Ok(IngestOutcome {
            report_id,
            created,
            counts,
        })
    }

    async fn apply_policy(
        &self,
        tx: &mut dyn LedgerTx,
        report_id: ReportId,
        batch: &StatementBatch,
    ) -> Result<(), IngestError> {
        for kind in StatementKind::ALL {
            if batch.items(kind).is_empty() {
                continue;
            }
            match self.policy {
                ReingestPolicy::Append => {}
                ReingestPolicy::Replace => {
                    let removed = tx.delete_items(report_id, kind).await?;
                    if removed > 0 {
                        info!(report_id, %kind, removed, "replacing stored items");
                    }
                }
                ReingestPolicy::Reject => {
                    if tx.count_items(report_id, kind).await? > 0 {
                        return Err(IngestError::Reingest { report_id, kind });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Replace".parse::<ReingestPolicy>().unwrap(), ReingestPolicy::Replace);
        assert_eq!(" append ".parse::<ReingestPolicy>().unwrap(), ReingestPolicy::Append);
        assert_eq!("REJECT".parse::<ReingestPolicy>().unwrap(), ReingestPolicy::Reject);
        assert!(matches!(
            "merge".parse::<ReingestPolicy>(),
            Err(IngestError::UnknownPolicy(value)) if value == "merge"
        ));
    }

    #[test]
    fn default_policy_is_replace() {
        assert_eq!(ReingestPolicy::default(), ReingestPolicy::Replace);
        assert_eq!(ReingestPolicy::default().to_string(), "replace");
    }
}
