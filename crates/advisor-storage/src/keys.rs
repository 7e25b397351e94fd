//! Storage key layout for report files.

use advisor_core::models::ReportFormat;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

pub fn report_prefix(report_id: Uuid) -> String {
    format!("reports/{}", report_id)
}

/// Key of an uploaded CSV: `reports/{id}/source-{upload_id}.csv`. Every upload
/// gets a fresh key, so a run that already claimed the report keeps reading
/// the bytes it claimed.
pub fn source_csv_key(report_id: Uuid, upload_id: Uuid) -> String {
    format!("{}/source-{}.csv", report_prefix(report_id), upload_id.simple())
}

/// Key of a report file: `reports/{id}/source.csv`, `report.html` or `report.pdf`.
pub fn report_file_key(report_id: Uuid, format: ReportFormat) -> String {
    let name = match format {
        ReportFormat::Csv => "source.csv",
        ReportFormat::Html => "report.html",
        ReportFormat::Pdf => "report.pdf",
    };
    format!("{}/{}", report_prefix(report_id), name)
}

/// Rejects keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part == ".." || part == "." || part.is_empty())
    {
        return Err(StorageError::InvalidKey(format!(
            "Storage key '{}' is not allowed",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_keys_share_a_prefix() {
        let id = Uuid::nil();
        assert_eq!(
            report_file_key(id, ReportFormat::Csv),
            "reports/00000000-0000-0000-0000-000000000000/source.csv"
        );
        assert!(report_file_key(id, ReportFormat::Pdf).starts_with(&report_prefix(id)));
    }

    #[test]
    fn each_upload_gets_its_own_key() {
        let id = Uuid::new_v4();
        let first = source_csv_key(id, Uuid::new_v4());
        let second = source_csv_key(id, Uuid::new_v4());
        assert_ne!(first, second);
        assert!(first.starts_with(&report_prefix(id)));
        assert!(first.ends_with(".csv"));
        assert!(validate_key(&first).is_ok());
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(validate_key("reports/a/source.csv").is_ok());
        for key in ["", "/etc/passwd", "../secret", "reports/../../x", "a//b", "a\\b"] {
            assert!(validate_key(key).is_err(), "{} should be rejected", key);
        }
    }
}
