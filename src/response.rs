//! Pulls the human answer and the embedded chart record out of a raw model
//! response. Locating the structured region and parsing it are separate steps,
//! so a different convention only needs another [`ResponseParser`].

use crate::error::ExtractionError;
use crate::prompt::ResponseFormat;

const DEFAULT_CHART_TYPE: &str = "line";

/// The parsed chart block, with `chart_type` split off from the data columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    pub chart_type: String,
    pub columns: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct Extraction {
    pub answer: String,
    pub record: Result<StructuredRecord, ExtractionError>,
}

pub trait ResponseParser {
    /// The natural-language part shown to the user.
    fn answer_text<'a>(&self, raw: &'a str) -> &'a str;

    /// The region holding the structured block, if any.
    fn locate<'a>(&self, raw: &'a str) -> Option<&'a str>;
}

/// `<answer>...</answer>` and `<json>...</json>` envelope.
pub struct TaggedParser;

/// Bare object: first `{` through last `}`.
pub struct BareJsonParser;

impl ResponseParser for TaggedParser {
    fn answer_text<'a>(&self, raw: &'a str) -> &'a str {
        between(raw, "<answer>", "</answer>").unwrap_or(raw)
    }

    fn locate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        between(raw, "<json>", "</json>")
    }
}

impl ResponseParser for BareJsonParser {
    fn answer_text<'a>(&self, raw: &'a str) -> &'a str {
        raw
    }

    fn locate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        (end > start).then(|| &raw[start..=end])
    }
}

/// Trimmed text between `open` and the first `close` after it.
fn between<'a>(raw: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = raw.find(open)? + open.len();
    let len = raw[start..].find(close)?;
    Some(raw[start..start + len].trim())
}

pub fn parser_for(format: ResponseFormat) -> &'static dyn ResponseParser {
    match format {
        ResponseFormat::Tagged => &TaggedParser,
        ResponseFormat::Bare => &BareJsonParser,
    }
}

pub fn parse_record(region: &str) -> Result<StructuredRecord, ExtractionError> {
    let value: serde_json::Value = serde_json::from_str(region)?;
    let serde_json::Value::Object(mut columns) = value else {
        return Err(ExtractionError::NotAnObject);
    };

    let chart_type = match columns.shift_remove("chart_type") {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => {
            tracing::warn!("Ignoring non-string chart_type {}", other);
            DEFAULT_CHART_TYPE.to_string()
        }
        None => DEFAULT_CHART_TYPE.to_string(),
    };

    Ok(StructuredRecord {
        chart_type,
        columns,
    })
}

/// Never fails: a missing or broken block only empties `record`.
pub fn extract(format: ResponseFormat, raw: &str) -> Extraction {
    let parser = parser_for(format);
    let answer = parser.answer_text(raw).to_string();
    let record = match parser.locate(raw) {
        Some(region) => parse_record(region),
        None => Err(ExtractionError::Missing),
    };

    if let Err(e) = &record {
        tracing::debug!("No structured data extracted: {}", e);
    }

    Extraction { answer, record }
}
