//! Multipart CSV upload extraction.

use advisor_core::AppError;
use advisor_processing::UploadValidator;
use axum::extract::Multipart;
use bytes::Bytes;

/// The single `file` field of an upload request.
#[derive(Debug)]
pub struct UploadedCsv {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Reads exactly one field named `file`. Other fields are ignored.
pub async fn read_csv_field(multipart: &mut Multipart) -> Result<UploadedCsv, AppError> {
    let mut upload: Option<UploadedCsv> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(AppError::field(
                "file",
                "Send exactly one field named 'file'",
            ));
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?;

        upload = Some(UploadedCsv {
            filename: filename.unwrap_or_else(|| "upload.csv".to_string()),
            content_type,
            data,
        });
    }

    upload.ok_or_else(|| AppError::field("file", "No file provided"))
}

impl UploadedCsv {
    pub fn validate(&self, max_size: usize) -> Result<(), AppError> {
        UploadValidator::new(max_size).validate_all(
            &self.filename,
            self.content_type.as_deref(),
            self.data.len(),
        )?;
        Ok(())
    }
}
