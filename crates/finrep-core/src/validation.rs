//! Boundary checks that turn soft parse results into hard, per-record rejections.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{NormalizedReport, ReportPeriod, ReportRecord, ReportType, StatementItemInput};

pub const MAX_SYMBOL_LEN: usize = 10;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_ITEM_CODE_LEN: usize = 16;
pub const MIN_REPORT_YEAR: i32 = 1900;
pub const MAX_REPORT_YEAR: i32 = 2100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("report type is missing or unrecognized")]
    MissingReportType,
    #[error("unknown report type: {0}")]
    UnknownReportType(String),
    #[error("report year is missing")]
    MissingReportYear,
    #[error("report year {0} is outside 1900..=2100")]
    YearOutOfRange(i32),
    #[error("report quarter must be empty for annual reports")]
    QuarterOnAnnual,
    #[error("report quarter is required for quarterly reports")]
    MissingQuarter,
    #[error("report quarter {0} is outside 1..=4")]
    QuarterOutOfRange(u8),
    #[error("sign must be 1 or -1, got {0}")]
    InvalidSign(i16),
    #[error("{field} must be at least 1")]
    NotPositive { field: &'static str },
}

/// A record excluded from a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub symbol: String,
    pub report_name: Option<String>,
    pub reason: String,
}

fn required_text(value: Option<&str>, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

pub fn validate_report(report: &NormalizedReport) -> Result<ReportRecord, ValidationError> {
    let symbol = required_text(Some(report.symbol.as_str()), "symbol", MAX_SYMBOL_LEN)?;
    let company_name = required_text(report.company_name.as_deref(), "company_name", MAX_NAME_LEN)?;
    let report_name = required_text(report.report_name.as_deref(), "report_name", MAX_NAME_LEN)?;
    let report_url = report
        .report_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(ValidationError::Empty { field: "report_url" })?
        .to_string();

    let report_type = report.report_type.ok_or(ValidationError::MissingReportType)?;
    let year = report.report_year.ok_or(ValidationError::MissingReportYear)?;
    if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
        return Err(ValidationError::YearOutOfRange(year));
    }

    let period = match (report_type, report.report_quarter) {
        (ReportType::Annual, None) => ReportPeriod::Annual { year },
        (ReportType::Annual, Some(_)) => return Err(ValidationError::QuarterOnAnnual),
        (ReportType::Quarterly, None) => return Err(ValidationError::MissingQuarter),
        (ReportType::Quarterly, Some(quarter @ 1..=4)) => ReportPeriod::Quarterly { year, quarter },
        (ReportType::Quarterly, Some(quarter)) => return Err(ValidationError::QuarterOutOfRange(quarter)),
    };

    Ok(ReportRecord {
        symbol: symbol.to_uppercase(),
        company_name,
        report_name,
        period,
        is_audited: report.is_audited,
        is_reviewed: report.is_reviewed,
        report_url,
    })
}

/// Validate each record independently; failures are collected, never fatal to the batch.
pub fn validate_batch(reports: Vec<NormalizedReport>) -> (Vec<ReportRecord>, Vec<Rejection>) {
    let mut accepted = Vec::with_capacity(reports.len());
    let mut rejected = Vec::new();
    for report in reports {
        match validate_report(&report) {
            Ok(record) => accepted.push(record),
            Err(err) => {
                warn!(symbol = %report.symbol, error = %err, "rejecting report");
                rejected.push(Rejection {
                    symbol: report.symbol,
                    report_name: report.report_name,
                    reason: err.to_string(),
                });
            }
        }
    }
    (accepted, rejected)
}

/// Shape checks for one statement line. Sign is already enforced by deserialization.
pub fn validate_item(item: &StatementItemInput) -> Result<(), ValidationError> {
    required_text(Some(item.item_name.as_str()), "item_name", MAX_NAME_LEN)?;
    if let Some(code) = &item.item_code {
        if code.chars().count() > MAX_ITEM_CODE_LEN {
            return Err(ValidationError::TooLong {
                field: "item_code",
                max: MAX_ITEM_CODE_LEN,
            });
        }
    }
    if item.level < 1 {
        return Err(ValidationError::NotPositive { field: "level" });
    }
    if item.item_display < 1 {
        return Err(ValidationError::NotPositive { field: "item_display" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sign;

    fn normalized() -> NormalizedReport {
        NormalizedReport {
            symbol: "VNM".into(),
            company_name: Some("vinamilk".into()),
            report_name: Some("BCTC hợp nhất năm 2024".into()),
            report_type: Some(ReportType::Annual),
            report_year: Some(2024),
            report_quarter: None,
            is_audited: true,
            is_reviewed: false,
            report_url: Some("https://example.test/vnm-2024.pdf".into()),
        }
    }

    #[test]
    fn valid_annual_report_passes() {
        let record = validate_report(&normalized()).unwrap();
        assert_eq!(record.period, ReportPeriod::Annual { year: 2024 });
        assert_eq!(record.key().report_quarter, None);
    }

    #[test]
    fn null_type_is_a_hard_rejection() {
        let mut report = normalized();
        report.report_type = None;
        assert_eq!(validate_report(&report), Err(ValidationError::MissingReportType));
    }

    #[test]
    fn quarter_and_type_must_agree() {
        let mut report = normalized();
        report.report_quarter = Some(2);
        assert_eq!(validate_report(&report), Err(ValidationError::QuarterOnAnnual));

        report.report_type = Some(ReportType::Quarterly);
        report.report_quarter = None;
        assert_eq!(validate_report(&report), Err(ValidationError::MissingQuarter));

        report.report_quarter = Some(5);
        assert_eq!(validate_report(&report), Err(ValidationError::QuarterOutOfRange(5)));
    }

    #[test]
    fn blank_fields_and_long_symbols_rejected() {
        let mut report = normalized();
        report.company_name = Some("   ".into());
        assert_eq!(
            validate_report(&report),
            Err(ValidationError::Empty { field: "company_name" })
        );

        let mut report = normalized();
        report.symbol = "ABCDEFGHIJK".into();
        assert!(matches!(validate_report(&report), Err(ValidationError::TooLong { field: "symbol", .. })));

        let mut report = normalized();
        report.report_url = None;
        assert_eq!(validate_report(&report), Err(ValidationError::Empty { field: "report_url" }));

        let mut report = normalized();
        report.report_year = Some(1850);
        assert_eq!(validate_report(&report), Err(ValidationError::YearOutOfRange(1850)));
    }

    #[test]
    fn batch_validation_keeps_going() {
        let mut bad = normalized();
        bad.report_type = None;
        let (accepted, rejected) = validate_batch(vec![bad, normalized()]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].symbol, "VNM");
    }

    #[test]
    fn item_shape_checks() {
        let mut item = StatementItemInput {
            item_name: "Tổng tài sản".into(),
            item_code: Some("270".into()),
            item_value: 10,
            sign: Sign::Positive,
            level: 1,
            item_display: 1,
            parent_code: None,
        };
        assert!(validate_item(&item).is_ok());

        item.level = 0;
        assert_eq!(validate_item(&item), Err(ValidationError::NotPositive { field: "level" }));

        item.level = 1;
        item.item_code = Some("X".repeat(17));
        assert!(validate_item(&item).is_err());
    }
}
