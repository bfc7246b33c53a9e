mod common;

use std::sync::Arc;

use common::{annual, line, record, FailingLedgerStore, INJECTED};
use finrep_core::{build_statement_tree, ReportPeriod, StatementBatch, StatementKind, ValidationError};
use finrep_ingest::{IngestError, IngestionCoordinator, ReingestPolicy};
use finrep_storage::{LedgerStore, MemoryLedgerStore, StoreError};

fn full_batch() -> StatementBatch {
    StatementBatch {
        balance_sheet: vec![line("100", None, 1), line("110", Some("100"), 2), line("120", Some("100"), 3)],
        income_statement: vec![line("10", None, 1), line("11", Some("100"), 2)],
        cash_flow: vec![line("20", None, 1)],
    }
}

#[tokio::test]
async fn ingest_writes_report_and_linked_items() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone()));

    let outcome = coordinator.ingest(&annual("VNM", 2024), &full_batch()).await.unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.counts.balance_sheet, 3);
    assert_eq!(outcome.counts.income_statement, 2);
    assert_eq!(outcome.counts.cash_flow, 1);

    let balance = store.items(outcome.report_id, StatementKind::BalanceSheet).await.unwrap();
    let tree = build_statement_tree(&balance);
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].children.len(), 2);

    // "100" only exists in the balance sheet; income statement codes start empty.
    let income = store.items(outcome.report_id, StatementKind::IncomeStatement).await.unwrap();
    assert_eq!(income[1].parent_id, None);
}

#[tokio::test]
async fn failure_in_last_kind_rolls_back_everything() {
    let memory = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(FailingLedgerStore::new(memory.clone(), StatementKind::CashFlow));

    let err = coordinator.ingest(&annual("VNM", 2024), &full_batch()).await.unwrap_err();
    match err {
        IngestError::Store(StoreError::Conflict(message)) => assert_eq!(message, INJECTED),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(memory.count_reports(None).await.unwrap(), 0);
    let mut tx = memory.begin().await.unwrap();
    assert_eq!(tx.find_report(&annual("VNM", 2024).key()).await.unwrap(), None);
    for kind in StatementKind::ALL {
        assert_eq!(tx.count_items(1, kind).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn failure_on_existing_report_keeps_previous_state() {
    let memory = MemoryLedgerStore::new();
    let good = IngestionCoordinator::new(Arc::new(memory.clone()));
    let first = good.ingest(&annual("VNM", 2024), &full_batch()).await.unwrap();

    let failing = IngestionCoordinator::new(FailingLedgerStore::new(memory.clone(), StatementKind::IncomeStatement));
    let mut renamed = annual("VNM", 2024);
    renamed.report_name = "renamed".into();
    assert!(failing.ingest(&renamed, &full_batch()).await.is_err());

    let stored = memory.report(first.report_id).await.unwrap().unwrap();
    assert_ne!(stored.report.report_name, "renamed");
    let balance = memory.items(first.report_id, StatementKind::BalanceSheet).await.unwrap();
    assert_eq!(balance.len(), 3);
}

#[tokio::test]
async fn reingest_overwrites_metadata_and_replaces_supplied_kinds() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone()));
    let first = coordinator.ingest(&annual("VNM", 2024), &full_batch()).await.unwrap();

    let mut audited = annual("VNM", 2024);
    audited.is_audited = true;
    audited.report_url = "https://example.test/VNM/audited.pdf".into();
    let replacement = StatementBatch {
        balance_sheet: vec![line("270", None, 1)],
        ..StatementBatch::default()
    };
    let second = coordinator.ingest(&audited, &replacement).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.report_id, first.report_id);
    let stored = store.report(first.report_id).await.unwrap().unwrap();
    assert!(stored.report.is_audited);
    assert_eq!(stored.report.report_url, "https://example.test/VNM/audited.pdf");

    assert_eq!(store.items(first.report_id, StatementKind::BalanceSheet).await.unwrap().len(), 1);
    assert_eq!(store.items(first.report_id, StatementKind::IncomeStatement).await.unwrap().len(), 2);
    assert_eq!(store.items(first.report_id, StatementKind::CashFlow).await.unwrap().len(), 1);
    assert_eq!(store.count_reports(None).await.unwrap(), 1);
}

#[tokio::test]
async fn append_policy_keeps_existing_items() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone())).with_policy(ReingestPolicy::Append);
    let batch = StatementBatch {
        cash_flow: vec![line("20", None, 1)],
        ..StatementBatch::default()
    };
    let first = coordinator.ingest(&annual("FPT", 2024), &batch).await.unwrap();
    coordinator.ingest(&annual("FPT", 2024), &batch).await.unwrap();
    assert_eq!(store.items(first.report_id, StatementKind::CashFlow).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reject_policy_refuses_to_overwrite_items() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone())).with_policy(ReingestPolicy::Reject);
    let quarter = record("FPT", ReportPeriod::Quarterly { year: 2025, quarter: 3 });
    let first = coordinator.ingest(&quarter, &full_batch()).await.unwrap();

    // Metadata-only upserts touch no kinds and are allowed.
    coordinator.ingest(&quarter, &StatementBatch::default()).await.unwrap();

    let err = coordinator.ingest(&quarter, &full_batch()).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Reingest { report_id, kind: StatementKind::BalanceSheet } if report_id == first.report_id
    ));
    assert_eq!(store.items(first.report_id, StatementKind::BalanceSheet).await.unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_items_are_refused_before_any_write() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone()));
    let mut bad = line("100", None, 1);
    bad.level = 0;
    let batch = StatementBatch {
        income_statement: vec![line("10", None, 1), bad],
        ..StatementBatch::default()
    };

    let err = coordinator.ingest(&annual("VNM", 2024), &batch).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::InvalidItem {
            kind: StatementKind::IncomeStatement,
            index: 1,
            source: ValidationError::NotPositive { field: "level" },
        }
    ));
    assert_eq!(store.count_reports(None).await.unwrap(), 0);
}
