//! Fiscal period tokens such as `Q3/2025` or `CN/2025`.

use serde::{Deserialize, Serialize};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::ReportType;

/// Period tags that mean "full year".
pub const ANNUAL_SYNONYMS: [&str; 4] = ["CN", "NAM", "NĂM", "YEAR"];

/// Soft parse result. All three fields are `None` for malformed tokens; a token with a
/// valid year but an unknown tag keeps the year and leaves type and quarter empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPeriod {
    pub report_type: Option<ReportType>,
    pub report_year: Option<i32>,
    pub report_quarter: Option<u8>,
}

impl ParsedPeriod {
    const UNKNOWN: Self = Self {
        report_type: None,
        report_year: None,
        report_quarter: None,
    };

    const fn unclassified(year: i32) -> Self {
        Self {
            report_type: None,
            report_year: Some(year),
            report_quarter: None,
        }
    }
}

/// Parse a raw `<PERIOD>/<YEAR>` token. Never fails; see [`ParsedPeriod`].
pub fn parse_report_time(token: Option<&str>) -> ParsedPeriod {
    let Some(token) = token else {
        return ParsedPeriod::UNKNOWN;
    };
    let Some((period, year)) = token.split_once('/') else {
        if !token.trim().is_empty() {
            warn!(token, "report time has no period separator");
        }
        return ParsedPeriod::UNKNOWN;
    };

    let year = match year.trim().parse::<i32>() {
        Ok(year) => year,
        Err(err) => {
            warn!(token, error = %err, "failed to parse report year");
            return ParsedPeriod::UNKNOWN;
        }
    };

    let period = period.trim().nfc().collect::<String>().to_uppercase();
    if let Some(quarter) = quarter_digit(&period) {
        return ParsedPeriod {
            report_type: Some(ReportType::Quarterly),
            report_year: Some(year),
            report_quarter: Some(quarter),
        };
    }
    if ANNUAL_SYNONYMS.contains(&period.as_str()) {
        return ParsedPeriod {
            report_type: Some(ReportType::Annual),
            report_year: Some(year),
            report_quarter: None,
        };
    }

    ParsedPeriod::unclassified(year)
}

// `Q` followed by exactly one digit in 1..=4.
fn quarter_digit(period: &str) -> Option<u8> {
    let rest = period.strip_prefix('Q')?;
    let mut chars = rest.chars();
    let digit = chars.next()?.to_digit(10)?;
    if chars.next().is_some() || !(1..=4).contains(&digit) {
        return None;
    }
    Some(digit as u8)
}
