use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Per-file ingestion failure. The batch keeps going.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("failed to read PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no header row")]
    EmptyCsv,

    #[error("uploads directory not found: {}", .0.display())]
    MissingDir(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("request to completion API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode completion response: {0}")]
    Decode(String),

    #[error("completion API returned no content")]
    EmptyResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no structured data block in the response")]
    Missing,

    #[error("structured data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("structured data is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChartError {
    #[error("No numeric data found for visualization.")]
    NoNumericColumns,

    #[error("{chart} chart needs at least {needed} columns, found {found}")]
    NotEnoughColumns {
        chart: &'static str,
        needed: usize,
        found: usize,
    },

    #[error("column '{0}' is not a list of values")]
    NotASeries(String),

    #[error("column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("Please enter a question.")]
    EmptyQuestion,

    #[error("No data available. Upload at least one PDF or CSV file to begin.")]
    NoData,

    #[error("Completion API error: {0}")]
    Completion(#[from] CompletionError),
}
