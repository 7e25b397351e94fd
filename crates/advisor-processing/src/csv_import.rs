//! Azure Advisor CSV ingestion.
//!
//! Header names are matched case-insensitively after trimming, with the
//! aliases the portal and CLI exports use. Any invalid row rejects the whole
//! file; up to [`MAX_REPORTED_ROW_ERRORS`] row errors are reported back.

use std::collections::HashMap;
use std::str::FromStr;

use advisor_core::constants::{DEFAULT_CURRENCY, MAX_REPORTED_ROW_ERRORS};
use advisor_core::models::{BusinessImpact, Category, NewRecommendation};
use advisor_core::AppError;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Category,
    BusinessImpact,
    Recommendation,
    SubscriptionId,
    SubscriptionName,
    ResourceGroup,
    ResourceName,
    ResourceType,
    UpdatedDate,
    PotentialBenefits,
    PotentialSavings,
    Currency,
    RetirementDate,
    RetiringFeature,
}

impl Column {
    const REQUIRED: [Column; 3] = [
        Column::Category,
        Column::BusinessImpact,
        Column::Recommendation,
    ];

    fn from_header(header: &str) -> Option<Column> {
        let normalized = header
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let column = match normalized.as_str() {
            "category" => Column::Category,
            "business impact" | "impact" => Column::BusinessImpact,
            "recommendation" | "description" => Column::Recommendation,
            "subscription id" => Column::SubscriptionId,
            "subscription name" => Column::SubscriptionName,
            "resource group" => Column::ResourceGroup,
            "resource name" | "impacted value" => Column::ResourceName,
            "type" | "resource type" => Column::ResourceType,
            "updated date" => Column::UpdatedDate,
            "potential benefits" => Column::PotentialBenefits,
            "potential annual cost savings" | "potential annual savings" | "annual savings" => {
                Column::PotentialSavings
            }
            "currency" => Column::Currency,
            "retirement date" => Column::RetirementDate,
            "retiring feature" => Column::RetiringFeature,
            _ => return None,
        };
        Some(column)
    }

    fn display_name(&self) -> &'static str {
        match self {
            Column::Category => "Category",
            Column::BusinessImpact => "Business Impact",
            Column::Recommendation => "Recommendation",
            Column::SubscriptionId => "Subscription ID",
            Column::SubscriptionName => "Subscription Name",
            Column::ResourceGroup => "Resource Group",
            Column::ResourceName => "Resource Name",
            Column::ResourceType => "Type",
            Column::UpdatedDate => "Updated Date",
            Column::PotentialBenefits => "Potential Benefits",
            Column::PotentialSavings => "Potential Annual Cost Savings",
            Column::Currency => "Currency",
            Column::RetirementDate => "Retirement Date",
            Column::RetiringFeature => "Retiring Feature",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CsvImportError {
    #[error("The CSV file is empty")]
    Empty,

    #[error("The CSV file has a header but no recommendations")]
    NoRows,

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("The CSV file has more than {max} rows")]
    TooManyRows { max: usize },

    #[error("The CSV file contains {total} invalid row(s)")]
    InvalidRows { total: usize, errors: Vec<String> },

    #[error("The CSV file could not be read: {0}")]
    Malformed(String),
}

impl From<CsvImportError> for AppError {
    fn from(err: CsvImportError) -> Self {
        let row_errors = match &err {
            CsvImportError::InvalidRows { errors, .. } => errors.clone(),
            _ => Vec::new(),
        };
        AppError::CsvFormat {
            message: err.to_string(),
            row_errors,
        }
    }
}

/// Column positions resolved from the header row.
struct HeaderMap(HashMap<Column, usize>);

impl HeaderMap {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, CsvImportError> {
        let mut map = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = Column::from_header(header) {
                // first occurrence wins when an export repeats a column
                map.entry(column).or_insert(idx);
            }
        }

        let missing: Vec<String> = Column::REQUIRED
            .iter()
            .filter(|c| !map.contains_key(c))
            .map(|c| c.display_name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CsvImportError::MissingColumns(missing));
        }
        Ok(HeaderMap(map))
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: Column) -> Option<&'r str> {
        self.0
            .get(&column)
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CsvImporter {
    max_rows: usize,
}

impl CsvImporter {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    fn reader(data: &[u8]) -> csv::Reader<&[u8]> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data)
    }

    /// Quick structural check done at upload time: readable header with the
    /// required columns and at least one data row.
    pub fn check_header(&self, data: &[u8]) -> Result<(), CsvImportError> {
        if is_blank(data) {
            return Err(CsvImportError::Empty);
        }
        let mut reader = Self::reader(data);
        let headers = reader
            .headers()
            .map_err(|e| CsvImportError::Malformed(e.to_string()))?
            .clone();
        HeaderMap::resolve(&headers)?;

        let mut record = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(true) if record.iter().all(|f| f.is_empty()) => continue,
                Ok(true) => return Ok(()),
                Ok(false) => return Err(CsvImportError::NoRows),
                Err(e) => return Err(CsvImportError::Malformed(e.to_string())),
            }
        }
    }

    /// Parses every row. Fails if any row is invalid.
    pub fn parse(&self, data: &[u8]) -> Result<Vec<NewRecommendation>, CsvImportError> {
        if is_blank(data) {
            return Err(CsvImportError::Empty);
        }
        let mut reader = Self::reader(data);
        let headers = reader
            .headers()
            .map_err(|e| CsvImportError::Malformed(e.to_string()))?
            .clone();
        let header_map = HeaderMap::resolve(&headers)?;

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        let mut error_total = 0usize;
        let mut record = csv::StringRecord::new();

        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(CsvImportError::Malformed(e.to_string())),
            }
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            if rows.len() + error_total >= self.max_rows {
                return Err(CsvImportError::TooManyRows { max: self.max_rows });
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            match parse_row(&header_map, &record) {
                Ok(row) => rows.push(row),
                Err(message) => {
                    error_total += 1;
                    if errors.len() < MAX_REPORTED_ROW_ERRORS {
                        errors.push(format!("Row {}: {}", line, message));
                    }
                }
            }
        }

        if error_total > 0 {
            return Err(CsvImportError::InvalidRows {
                total: error_total,
                errors,
            });
        }
        if rows.is_empty() {
            return Err(CsvImportError::NoRows);
        }

        tracing::debug!(rows = rows.len(), "Parsed Advisor CSV");
        Ok(rows)
    }
}

fn is_blank(data: &[u8]) -> bool {
    data.strip_prefix(UTF8_BOM)
        .unwrap_or(data)
        .iter()
        .all(|b| b.is_ascii_whitespace())
}

fn parse_row(
    headers: &HeaderMap,
    record: &csv::StringRecord,
) -> Result<NewRecommendation, String> {
    let mut problems = Vec::new();

    let category = match headers.get(record, Column::Category) {
        Some(raw) => Category::parse_loose(raw)
            .ok_or_else(|| format!("unknown category '{}'", raw))
            .map_err(|e| problems.push(e))
            .ok(),
        None => {
            problems.push("Category is empty".to_string());
            None
        }
    };

    let business_impact = match headers.get(record, Column::BusinessImpact) {
        Some(raw) => BusinessImpact::from_str(raw)
            .map_err(|_| problems.push(format!("unknown business impact '{}'", raw)))
            .ok(),
        None => {
            problems.push("Business Impact is empty".to_string());
            None
        }
    };

    let recommendation = headers.get(record, Column::Recommendation).map(String::from);
    if recommendation.is_none() {
        problems.push("Recommendation is empty".to_string());
    }

    let raw_savings = headers.get(record, Column::PotentialSavings);
    let potential_savings = match raw_savings.map(parse_savings).transpose() {
        Ok(value) => value.unwrap_or(Decimal::ZERO),
        Err(e) => {
            problems.push(e);
            Decimal::ZERO
        }
    };

    let currency = headers
        .get(record, Column::Currency)
        .map(|c| c.to_uppercase())
        .or_else(|| raw_savings.and_then(currency_from_symbol).map(String::from))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut date = |column: Column| match headers.get(record, column).map(parse_date) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            problems.push(format!("{} {}", column.display_name(), e));
            None
        }
        None => None,
    };
    let retirement_date = date(Column::RetirementDate);
    let advisor_updated_at = date(Column::UpdatedDate);

    let text = |column: Column| headers.get(record, column).map(String::from);

    match (category, business_impact, recommendation) {
        (Some(category), Some(business_impact), Some(recommendation)) if problems.is_empty() => {
            Ok(NewRecommendation {
                category,
                business_impact,
                recommendation,
                subscription_id: text(Column::SubscriptionId),
                subscription_name: text(Column::SubscriptionName),
                resource_group: text(Column::ResourceGroup),
                resource_name: text(Column::ResourceName),
                resource_type: text(Column::ResourceType),
                potential_benefits: text(Column::PotentialBenefits),
                potential_savings,
                currency,
                retirement_date,
                retiring_feature: text(Column::RetiringFeature),
                advisor_updated_at,
            })
        }
        _ => Err(problems.join("; ")),
    }
}

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[("$", "USD"), ("€", "EUR"), ("£", "GBP"), ("¥", "JPY")];

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "NZD", "CHF", "SEK", "NOK", "DKK", "INR", "CNY",
    "HKD", "SGD", "BRL", "MXN", "ZAR",
];

/// Largest value `recommendations.potential_savings` (`NUMERIC(14,2)`) can hold.
const MAX_SAVINGS_CENTS: i64 = 99_999_999_999_999;

/// Reads an annual savings amount. A currency symbol or ISO code may lead or
/// trail the number and `,` may group thousands, so `"$1,234.50"` and
/// `"1234.5 EUR"` both parse. Anything else is rejected. Empty means zero.
fn parse_savings(raw: &str) -> Result<Decimal, String> {
    let (_, amount) = split_currency(raw);
    if amount.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let not_a_number = || format!("savings '{}' is not a number", raw.trim());

    let (negative, unsigned) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };
    let integer_digits = ungroup_thousands(integer).ok_or_else(not_a_number)?;
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(not_a_number());
        }
    }

    let plain = match fraction {
        Some(fraction) => format!("{}.{}", integer_digits, fraction),
        None => integer_digits,
    };
    let value = Decimal::from_str(&plain).map_err(|_| not_a_number())?.round_dp(2);
    if negative && !value.is_zero() {
        return Err(format!("savings '{}' cannot be negative", raw.trim()));
    }
    if value > Decimal::new(MAX_SAVINGS_CENTS, 2) {
        return Err(format!("savings '{}' is too large", raw.trim()));
    }
    Ok(value)
}

/// `"1,234,567"` to `"1234567"`. Groups after the first must hold exactly
/// three digits.
fn ungroup_thousands(integer: &str) -> Option<String> {
    let mut groups = integer.split(',');
    let first = groups.next()?;
    let all_digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(first) {
        return None;
    }
    let mut digits = first.to_string();
    for group in groups {
        if first.len() > 3 || group.len() != 3 || !all_digits(group) {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

/// Splits a recognised currency symbol or code off either end of `raw`.
fn split_currency(raw: &str) -> (Option<&'static str>, &str) {
    let value = raw.trim();
    for &(symbol, code) in CURRENCY_SYMBOLS {
        if let Some(rest) = value
            .strip_prefix(symbol)
            .or_else(|| value.strip_suffix(symbol))
        {
            return (Some(code), rest.trim());
        }
    }
    for &code in CURRENCY_CODES {
        let n = code.len();
        if value.len() < n {
            continue;
        }
        if value.is_char_boundary(n) && value[..n].eq_ignore_ascii_case(code) {
            return (Some(code), value[n..].trim());
        }
        let tail = value.len() - n;
        if value.is_char_boundary(tail) && value[tail..].eq_ignore_ascii_case(code) {
            return (Some(code), value[..tail].trim());
        }
    }
    (None, value)
}

fn currency_from_symbol(raw: &str) -> Option<&'static str> {
    split_currency(raw).0
}

/// `YYYY-MM-DD`, `MM/DD/YYYY` or RFC 3339. `N/A` and `-` mean no date.
fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    if matches!(raw.to_lowercase().as_str(), "n/a" | "na" | "-" | "none") {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Ok(Some(date));
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(datetime.date_naive()));
    }
    Err(format!("'{}' is not a valid date", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\u{feff}Category,Business Impact,Recommendation,Subscription ID,Subscription Name,Resource Group,Resource Name,Type,Updated Date,Potential Annual Cost Savings,Currency\n\
        Cost,High,Right-size or shutdown underutilized virtual machines,3fa85f64-5717-4562-b3fc-2c963f66afa6,Production,rg-web,vm-web-01,Microsoft.Compute/virtualMachines,2026-09-30,\"$1,234.50\",USD\n\
        HighAvailability,Medium,Use Availability zones for better resiliency,3fa85f64-5717-4562-b3fc-2c963f66afa6,Production,rg-db,sql-01,Microsoft.Sql/servers,09/28/2026,,\n\
        Security,low,Enable MFA on accounts with owner permissions,3fa85f64-5717-4562-b3fc-2c963f66afa6,Production,,,,2026-09-01T10:00:00Z,0,\n";

    #[test]
    fn parses_portal_export() {
        let rows = CsvImporter::new(100).parse(EXPORT.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].category, Category::Cost);
        assert_eq!(rows[0].business_impact, BusinessImpact::High);
        assert_eq!(rows[0].potential_savings, Decimal::new(123450, 2));
        assert_eq!(rows[0].resource_name.as_deref(), Some("vm-web-01"));

        assert_eq!(rows[1].category, Category::Reliability);
        assert_eq!(rows[1].potential_savings, Decimal::ZERO);
        assert_eq!(rows[1].currency, "USD");
        assert_eq!(
            rows[1].advisor_updated_at,
            NaiveDate::from_ymd_opt(2026, 9, 28)
        );

        assert_eq!(rows[2].business_impact, BusinessImpact::Low);
        assert_eq!(rows[2].resource_group, None);
        assert_eq!(
            rows[2].advisor_updated_at,
            NaiveDate::from_ymd_opt(2026, 9, 1)
        );
    }

    #[test]
    fn header_aliases_and_case_are_accepted() {
        let csv = "  CATEGORY , impact,Description,Impacted Value,Annual Savings\n\
                   Operational Excellence,High,Create an Azure service health alert,rg-ops,12\n";
        let rows = CsvImporter::new(10).parse(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].category, Category::OperationalExcellence);
        assert_eq!(rows[0].resource_name.as_deref(), Some("rg-ops"));
        assert_eq!(rows[0].potential_savings, Decimal::new(12, 0));
    }

    #[test]
    fn missing_required_column_rejects_file() {
        let csv = "Category,Recommendation\nCost,Buy reserved instances\n";
        match CsvImporter::new(10).parse(csv.as_bytes()) {
            Err(CsvImportError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["Business Impact".to_string()])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn row_errors_carry_line_numbers() {
        let csv = "Category,Business Impact,Recommendation,Potential Annual Cost Savings\n\
                   Cost,High,Buy reservations,100\n\
                   Networking,High,Something,5\n\
                   Cost,Huge,Other,-3\n";
        match CsvImporter::new(10).parse(csv.as_bytes()) {
            Err(CsvImportError::InvalidRows { total, errors }) => {
                assert_eq!(total, 2);
                assert!(errors[0].starts_with("Row 3:"), "{}", errors[0]);
                assert!(errors[0].contains("unknown category 'Networking'"));
                assert!(errors[1].starts_with("Row 4:"));
                assert!(errors[1].contains("unknown business impact"));
                assert!(errors[1].contains("cannot be negative"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reported_row_errors_are_capped() {
        let mut csv = String::from("Category,Business Impact,Recommendation\n");
        for _ in 0..30 {
            csv.push_str("Unknown,High,Text\n");
        }
        match CsvImporter::new(100).parse(csv.as_bytes()) {
            Err(CsvImportError::InvalidRows { total, errors }) => {
                assert_eq!(total, 30);
                assert_eq!(errors.len(), MAX_REPORTED_ROW_ERRORS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_and_header_only_files_are_rejected() {
        let importer = CsvImporter::new(10);
        assert!(matches!(importer.parse(b""), Err(CsvImportError::Empty)));
        assert!(matches!(importer.parse(b"\xEF\xBB\xBF \n"), Err(CsvImportError::Empty)));
        assert!(matches!(
            importer.parse(b"Category,Business Impact,Recommendation\n"),
            Err(CsvImportError::NoRows)
        ));
        assert!(matches!(
            importer.check_header(b"Category,Business Impact,Recommendation\n,,\n"),
            Err(CsvImportError::NoRows)
        ));
    }

    #[test]
    fn row_limit_is_enforced() {
        let csv = "Category,Business Impact,Recommendation\n\
                   Cost,High,A\nCost,High,B\nCost,High,C\n";
        assert!(matches!(
            CsvImporter::new(2).parse(csv.as_bytes()),
            Err(CsvImportError::TooManyRows { max: 2 })
        ));
        assert!(CsvImporter::new(3).parse(csv.as_bytes()).is_ok());
    }

    #[test]
    fn import_errors_become_csv_format_errors() {
        let err: AppError = CsvImportError::InvalidRows {
            total: 1,
            errors: vec!["Row 2: Category is empty".to_string()],
        }
        .into();
        assert_eq!(
            err.field_errors().unwrap()["file"],
            vec!["Row 2: Category is empty".to_string()]
        );
    }

    #[test]
    fn savings_parsing() {
        assert_eq!(parse_savings("1,000").unwrap(), Decimal::new(1000, 0));
        assert_eq!(parse_savings("€ 99.999").unwrap(), Decimal::new(10000, 2));
        assert_eq!(parse_savings("$1,234.50").unwrap(), Decimal::new(123450, 2));
        assert_eq!(parse_savings("1234.5 eur").unwrap(), Decimal::new(12345, 1));
        assert_eq!(parse_savings("USD 12,345,678").unwrap(), Decimal::new(12345678, 0));
        assert_eq!(parse_savings("$").unwrap(), Decimal::ZERO);
        assert_eq!(parse_savings("-0").unwrap(), Decimal::ZERO);
        assert!(parse_savings("lots").is_err());
        assert!(parse_savings("-5").is_err());
    }

    #[test]
    fn savings_with_stray_characters_are_rejected() {
        for raw in [
            "12abc34",
            "1e5",
            "1.234,50",
            "approx 40 per month 12",
            "1,23",
            "1234,567",
            "12.",
            "1.2.3",
            "1 234",
            "$$5",
            "5 USD EUR",
        ] {
            assert!(parse_savings(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn savings_must_fit_the_stored_precision() {
        assert_eq!(
            parse_savings("999,999,999,999.99").unwrap(),
            Decimal::new(MAX_SAVINGS_CENTS, 2)
        );
        assert!(parse_savings("1000000000000").is_err());
        assert!(parse_savings("999999999999.999").is_err());
        assert!(parse_savings("99999999999999999999999999999999").is_err());
    }

    #[test]
    fn unparsable_savings_fail_the_row() {
        let csv = "Category,Business Impact,Recommendation,Potential Annual Cost Savings\n\
                   Cost,High,Shut down idle VMs,12abc34\n\
                   Cost,High,Buy reservations,1000000000000\n";
        match CsvImporter::new(10).parse(csv.as_bytes()) {
            Err(CsvImportError::InvalidRows { total, errors }) => {
                assert_eq!(total, 2);
                assert!(errors[0].contains("'12abc34' is not a number"), "{}", errors[0]);
                assert!(errors[1].contains("too large"), "{}", errors[1]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
