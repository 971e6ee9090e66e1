//! Form input parsing shared by the services.
//!
//! Every failure is an [`AppError::Validation`] whose message is shown to the
//! user as a flash.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use taskdesk_common::{AppError, AppResult};

/// Parse a money amount typed into a form.
///
/// Thousands separators and spaces are ignored. The result must be a finite,
/// non-negative number.
pub fn parse_amount(raw: &str) -> AppResult<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(AppError::Validation("Amount is required.".to_string()));
    }

    match cleaned.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        Ok(_) => Err(AppError::Validation(
            "Amount must be zero or more.".to_string(),
        )),
        Err(_) => Err(AppError::Validation(format!("Invalid amount: {raw}"))),
    }
}

/// Like [`parse_amount`], but blank input means "no amount".
pub fn parse_optional_amount(raw: Option<&str>) -> AppResult<Option<f64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_amount(value).map(Some),
    }
}

/// Parse a `datetime-local` form value (`2025-03-01T14:30`) or an RFC 3339
/// timestamp. Local values without an offset are taken as UTC.
pub fn parse_datetime(raw: &str) -> AppResult<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).fixed_offset());
    }

    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| AppError::Validation(format!("Invalid date/time: {raw}")))
}

/// Like [`parse_datetime`], but blank input means "not set".
pub fn parse_optional_datetime(raw: Option<&str>) -> AppResult<Option<DateTime<FixedOffset>>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_datetime(value).map(Some),
    }
}

/// Uppercased currency code, or `default` when blank.
#[must_use]
pub fn currency_or(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default)
        .to_uppercase()
}

/// Trimmed text, `None` when blank.
#[must_use]
pub fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Current time as stored in the database.
#[must_use]
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,500").unwrap(), 1500.0);
        assert_eq!(parse_amount(" 2 000.50 ").unwrap(), 2000.5);
        assert_eq!(parse_amount("0").unwrap(), 0.0);
        assert!(matches!(parse_amount("-1"), Err(AppError::Validation(_))));
        assert!(matches!(parse_amount("abc"), Err(AppError::Validation(_))));
        assert!(matches!(parse_amount(""), Err(AppError::Validation(_))));
        assert!(matches!(parse_amount("inf"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_parse_optional_amount() {
        assert_eq!(parse_optional_amount(None).unwrap(), None);
        assert_eq!(parse_optional_amount(Some("  ")).unwrap(), None);
        assert_eq!(parse_optional_amount(Some("250")).unwrap(), Some(250.0));
    }

    #[test]
    fn test_parse_datetime() {
        let local = parse_datetime("2025-03-01T14:30").unwrap();
        assert_eq!(local.to_rfc3339(), "2025-03-01T14:30:00+00:00");

        let offset = parse_datetime("2025-03-01T14:30:00+03:00").unwrap();
        assert_eq!(offset.to_rfc3339(), "2025-03-01T11:30:00+00:00");

        assert!(parse_datetime("next tuesday").is_err());
        assert_eq!(parse_optional_datetime(Some("")).unwrap(), None);
    }

    #[test]
    fn test_currency_or() {
        assert_eq!(currency_or(Some(" usd "), "UGX"), "USD");
        assert_eq!(currency_or(Some(""), "UGX"), "UGX");
        assert_eq!(currency_or(None, "ugx"), "UGX");
    }
}
