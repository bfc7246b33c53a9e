//! Ingestion pipeline: report deduplication, statement hierarchy resolution and the
//! transactional coordinator that persists a report with its three statements.

use finrep_core::{ReportId, StatementKind, ValidationError};
use finrep_storage::StoreError;
use thiserror::Error;

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod resolver;
pub mod sync;

pub use config::IngestConfig;
pub use coordinator::{IngestOutcome, IngestionCoordinator, ReingestPolicy};
pub use dedup::{deduplicate, normalize_raw, prioritize};
pub use resolver::{resolve, CodeMap, HierarchyResolver};
pub use sync::{sync_reports, sync_symbols, SymbolOutcome, SyncPipeline, SyncRunSummary, SyncSummary};

pub const CRATE_NAME: &str = "finrep-ingest";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("report {report_id} already has {kind} items")]
    Reingest { report_id: ReportId, kind: StatementKind },
    #[error("{kind} item #{index} is invalid: {source}")]
    InvalidItem {
        kind: StatementKind,
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("unknown re-ingest policy: {0}")]
    UnknownPolicy(String),
}
