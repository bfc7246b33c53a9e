use std::path::Path;
use std::sync::Arc;

use finrep_adapters::FixtureReportSource;
use finrep_core::{NormalizedReport, ReportType};
use finrep_ingest::{sync_reports, sync_symbols, IngestionCoordinator, SyncPipeline};
use finrep_storage::{LedgerStore, MemoryLedgerStore, ReportFilter};

fn fixture_source() -> FixtureReportSource {
    FixtureReportSource::new("vietstock", Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures"))
}

#[tokio::test]
async fn symbols_sync_independently() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone()));
    let source = fixture_source();

    let outcomes = sync_symbols(&source, &coordinator, &["vnm", "ZZZ", "fpt", "VNM"]).await;
    assert_eq!(outcomes.len(), 3);

    let vnm = &outcomes[0];
    assert_eq!(vnm.symbol, "VNM");
    let summary = vnm.summary.as_ref().unwrap();
    assert_eq!((summary.total, summary.created, summary.updated, summary.rejected), (4, 3, 0, 1));

    assert_eq!(outcomes[1].symbol, "ZZZ");
    assert!(!outcomes[1].is_success());
    assert!(outcomes[1].error.as_deref().unwrap().contains("ZZZ"));

    let fpt = outcomes[2].summary.as_ref().unwrap();
    assert_eq!((fpt.total, fpt.created), (2, 2));

    let vnm_reports = store.reports(&ReportFilter::for_symbol("VNM")).await.unwrap();
    let tokens: Vec<_> = vnm_reports.iter().map(|r| r.report.period.token()).collect();
    assert_eq!(tokens, vec!["Q1/2025", "Q2/2025", "CN/2024"]);
    assert!(vnm_reports[2].report.is_audited);
}

#[tokio::test]
async fn rerunning_a_sync_updates_instead_of_duplicating() {
    let store = MemoryLedgerStore::new();
    let pipeline = SyncPipeline::new(
        Arc::new(fixture_source()),
        IngestionCoordinator::new(Arc::new(store.clone())),
    );

    let first = pipeline.run_once(&["VNM", "FPT"]).await;
    assert_eq!(first.source_id, "vietstock");
    assert_eq!(first.failed_symbols, 0);
    assert_eq!(first.totals.created, 5);

    let second = pipeline.run_once(&["VNM", "FPT"]).await;
    assert_eq!(second.totals.created, 0);
    assert_eq!(second.totals.updated, 5);
    assert_eq!(store.count_reports(None).await.unwrap(), 5);
}

#[tokio::test]
async fn invalid_records_are_counted_not_fatal() {
    let store = MemoryLedgerStore::new();
    let coordinator = IngestionCoordinator::new(Arc::new(store.clone()));
    let good = NormalizedReport {
        symbol: "HPG".into(),
        company_name: Some("Hòa Phát".into()),
        report_name: Some("BCTC năm 2024".into()),
        report_type: Some(ReportType::Annual),
        report_year: Some(2024),
        report_quarter: None,
        is_audited: true,
        is_reviewed: false,
        report_url: Some("https://example.test/hpg.pdf".into()),
    };
    let mut no_type = good.clone();
    no_type.report_type = None;
    let mut no_url = good.clone();
    no_url.report_url = None;

    let summary = sync_reports(&coordinator, vec![no_type, good, no_url]).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.rejections.len(), 2);
    assert_eq!(store.count_reports(Some("hpg")).await.unwrap(), 1);
}
