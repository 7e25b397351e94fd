//! Advisor Processing Library
//!
//! Turns an Azure Advisor CSV export into recommendations, aggregates them
//! into an [`advisor_core::models::AnalysisSummary`] and renders the HTML and
//! PDF report documents.

pub mod analysis;
pub mod csv_import;
pub mod render;
pub mod validator;

pub use analysis::summarize;
pub use csv_import::{CsvImportError, CsvImporter};
pub use render::{HtmlRenderer, RenderContext, RenderError};
#[cfg(feature = "pdf")]
pub use render::PdfRenderer;
pub use validator::{UploadValidator, ValidationError};
