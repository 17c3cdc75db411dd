use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Csv,
}

impl DocumentKind {
    /// Picks the kind from the file extension; anything else is unsupported.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".pdf") {
            Some(DocumentKind::Pdf)
        } else if lower.ends_with(".csv") {
            Some(DocumentKind::Csv)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "PDF"),
            DocumentKind::Csv => write!(f, "CSV"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub text: String,
    pub table: Option<DataTable>,
}

/// A parsed CSV: header row plus raw string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// True when every non-empty cell parses as a number and at least one does.
    pub fn is_numeric(&self, index: usize) -> bool {
        let mut seen = false;
        for cell in self.column(index) {
            if cell.is_empty() {
                continue;
            }
            if parse_number(cell).is_none() {
                return false;
            }
            seen = true;
        }
        seen
    }

    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.headers.len())
            .filter(|&i| self.is_numeric(i))
            .collect()
    }

    /// Typed view of one column. Mixed columns come back as text so a single
    /// series never holds both numbers and strings.
    pub fn series(&self, index: usize) -> Series {
        let numeric = self.is_numeric(index);
        let values = self
            .column(index)
            .map(|cell| {
                if cell.is_empty() {
                    Value::Null
                } else if numeric {
                    parse_number(cell).map(Value::Number).unwrap_or(Value::Null)
                } else {
                    Value::Text(cell.to_string())
                }
            })
            .collect();

        Series {
            name: self.headers.get(index).cloned().unwrap_or_default(),
            values,
        }
    }

    /// Renders the table the way a dataframe dump without index looks.
    pub fn to_text(&self) -> String {
        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.column(i)
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(render_row(self.headers.iter().map(String::as_str), &widths));
        for row in &self.rows {
            lines.push(render_row(row.iter().map(String::as_str), &widths));
        }
        lines.join("\n")
    }
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:>width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A single chart cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Null => Value::Null,
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<Value>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Turns a series holding both numbers and text into an all-text series.
    pub fn coerce_mixed(mut self) -> Self {
        let has_number = self.values.iter().any(|v| matches!(v, Value::Number(_)));
        let has_text = self.values.iter().any(|v| matches!(v, Value::Text(_)));
        if has_number && has_text {
            self.values = self
                .values
                .into_iter()
                .map(|v| match v {
                    Value::Number(_) => Value::Text(v.to_string()),
                    other => other,
                })
                .collect();
        }
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub raw_answer: String,
    pub asked_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(question: String, answer: String, raw_answer: String) -> Self {
        Self {
            question,
            answer,
            raw_answer,
            asked_at: Utc::now(),
        }
    }
}
