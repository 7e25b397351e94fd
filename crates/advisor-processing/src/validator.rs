use advisor_core::AppError;
use std::path::Path;

/// Upload checks for CSV exports, applied before anything is stored.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file extension: {extension} (allowed: csv)")]
    InvalidExtension { extension: String },

    #[error("Invalid content type: {content_type}")]
    InvalidContentType { content_type: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("The uploaded file is empty")]
    EmptyFile,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            other => AppError::field("file", other.to_string()),
        }
    }
}

/// Content types browsers and CLI tools send for `.csv` files.
const CSV_CONTENT_TYPES: &[&str] = &[
    "text/csv",
    "application/csv",
    "text/comma-separated-values",
    "application/vnd.ms-excel",
    "text/plain",
    "application/octet-stream",
];

pub struct UploadValidator {
    max_file_size: usize,
}

impl UploadValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn validate_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))?;

        if extension != "csv" {
            return Err(ValidationError::InvalidExtension { extension });
        }
        Ok(())
    }

    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if !CSV_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_all(
        &self,
        filename: &str,
        content_type: Option<&str>,
        file_size: usize,
    ) -> Result<(), ValidationError> {
        self.validate_extension(filename)?;
        if let Some(content_type) = content_type {
            self.validate_content_type(content_type)?;
        }
        self.validate_file_size(file_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_csv_uploads() {
        let validator = UploadValidator::new(1024);
        assert!(validator
            .validate_all("advisor-export.CSV", Some("text/csv; charset=utf-8"), 10)
            .is_ok());
        assert!(validator.validate_all("export.csv", None, 10).is_ok());
    }

    #[test]
    fn rejects_wrong_extension_and_type() {
        let validator = UploadValidator::new(1024);
        assert!(matches!(
            validator.validate_extension("export.xlsx"),
            Err(ValidationError::InvalidExtension { .. })
        ));
        assert!(matches!(
            validator.validate_extension("export"),
            Err(ValidationError::InvalidFilename(_))
        ));
        assert!(matches!(
            validator.validate_content_type("image/png"),
            Err(ValidationError::InvalidContentType { .. })
        ));
    }

    #[test]
    fn size_limits_map_to_http_errors() {
        let validator = UploadValidator::new(4);
        let err: AppError = validator.validate_file_size(5).unwrap_err().into();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        let err: AppError = validator.validate_file_size(0).unwrap_err().into();
        assert!(err.field_errors().unwrap().contains_key("file"));
    }
}
