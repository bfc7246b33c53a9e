//! Collapse repeated scrapes of the same fiscal period into one preferred record.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use finrep_core::{
    classify_audit, clean_report_name, is_parent_company_label, normalize_symbol, parse_report_time, DedupKey,
    NormalizedReport, RawReport,
};
use tracing::{debug, info};

/// Classify and clean one raw record. Parent-company filings yield `None`.
pub fn normalize_raw(raw: RawReport) -> Option<NormalizedReport> {
    if is_parent_company_label(raw.report_name.as_deref()) {
        debug!(report_name = ?raw.report_name, "skipping parent-company report");
        return None;
    }
    let audit = classify_audit(raw.report_name.as_deref());
    let period = parse_report_time(raw.report_time.as_deref());
    Some(NormalizedReport {
        symbol: normalize_symbol(raw.symbol.as_deref()),
        company_name: raw.company_name,
        report_name: clean_report_name(raw.report_name.as_deref()),
        report_type: period.report_type,
        report_year: period.report_year,
        report_quarter: period.report_quarter,
        is_audited: audit.is_audited,
        is_reviewed: audit.is_reviewed,
        report_url: raw.report_url,
    })
}

/// Normalize a raw batch, keep one record per fiscal period and sort the result.
pub fn deduplicate(raw: Vec<RawReport>) -> Vec<NormalizedReport> {
    let total = raw.len();
    let normalized: Vec<NormalizedReport> = raw.into_iter().filter_map(normalize_raw).collect();
    let filtered = total - normalized.len();
    let candidates = normalized.len();
    let kept = prioritize(normalized);
    info!(
        total,
        filtered,
        collapsed = candidates - kept.len(),
        kept = kept.len(),
        "deduplicated report batch"
    );
    kept
}

/// Keep the highest-priority record per dedup key; ties go to the earliest record.
/// Records without a report type are never grouped.
///
/// Re-run this, not [`deduplicate`], on already-normalized output: cleaned names no
/// longer carry the audit markers that `deduplicate` classifies from.
pub fn prioritize(reports: Vec<NormalizedReport>) -> Vec<NormalizedReport> {
    let mut kept: Vec<NormalizedReport> = Vec::with_capacity(reports.len());
    let mut slots: HashMap<DedupKey, usize> = HashMap::new();

    for report in reports {
        if report.report_type.is_none() {
            kept.push(report);
            continue;
        }
        match slots.entry(report.dedup_key()) {
            Entry::Occupied(slot) => {
                let current = &mut kept[*slot.get()];
                if report.priority() > current.priority() {
                    *current = report;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(report);
            }
        }
    }

    kept.sort_by(period_order);
    kept
}

fn period_order(a: &NormalizedReport, b: &NormalizedReport) -> Ordering {
    a.symbol
        .cmp(&b.symbol)
        .then_with(|| none_last(a.report_year, b.report_year, |x, y| y.cmp(&x)))
        .then_with(|| none_last(a.report_quarter, b.report_quarter, |x, y| x.cmp(&y)))
}

fn none_last<T: Copy>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
