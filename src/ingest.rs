use std::path::Path;

use crate::error::IngestionError;
use crate::models::{DataTable, DocumentKind, IngestedDocument, UploadedDocument};

lazy_static::lazy_static! {
    // lopdf leaves markers like "?Identity-H Unimplemented?" for encodings it can't decode
    static ref ENCODING_MARKER: regex::Regex =
        regex::Regex::new(r"\??[A-Za-z]+-[A-Z]\s+Unimplemented\??").unwrap();
}

/// Everything ingested for a session, plus the files that could not be read.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<IngestedDocument>,
    pub failures: Vec<(String, String)>,
}

impl Corpus {
    /// No PDF or CSV made it in. Callers treat this as "no data".
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// All extracted text, each section headed by its source file name.
    pub fn context_blob(&self) -> String {
        let mut blob = String::new();
        for doc in &self.documents {
            blob.push_str("\n\n### From ");
            blob.push_str(&doc.name);
            blob.push_str(":\n");
            blob.push_str(&doc.text);
        }
        blob
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &DataTable)> {
        self.documents
            .iter()
            .filter_map(|doc| doc.table.as_ref().map(|t| (doc.name.as_str(), t)))
    }

    /// The first uploaded CSV; the fallback chart is drawn from it.
    pub fn first_table(&self) -> Option<&DataTable> {
        self.tables().map(|(_, table)| table).next()
    }

    pub fn extend(&mut self, other: Corpus) {
        self.documents.extend(other.documents);
        self.failures.extend(other.failures);
    }
}

/// Ingests a batch. A bad file is recorded in `failures` and skipped.
pub fn ingest(documents: Vec<UploadedDocument>) -> Corpus {
    let mut corpus = Corpus::default();

    for doc in documents {
        tracing::info!("Ingesting {} ({})", doc.name, doc.kind);
        match ingest_one(&doc) {
            Ok(ingested) => corpus.documents.push(ingested),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", doc.name, e);
                corpus.failures.push((doc.name, e.to_string()));
            }
        }
    }

    tracing::info!(
        "Ingested {} documents ({} failed)",
        corpus.documents.len(),
        corpus.failures.len()
    );
    corpus
}

fn ingest_one(doc: &UploadedDocument) -> Result<IngestedDocument, IngestionError> {
    match doc.kind {
        DocumentKind::Pdf => Ok(IngestedDocument {
            name: doc.name.clone(),
            kind: doc.kind,
            text: extract_pdf_text(&doc.bytes)?,
            table: None,
        }),
        DocumentKind::Csv => {
            let table = parse_csv(&doc.bytes)?;
            Ok(IngestedDocument {
                name: doc.name.clone(),
                kind: doc.kind,
                text: table.to_text(),
                table: Some(table),
            })
        }
    }
}

/// Extracts text from an in-memory PDF, page by page in page order.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let mut text = String::new();

    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => tracing::debug!("No text on page {}: {}", page_num, e),
        }
    }

    Ok(ENCODING_MARKER.replace_all(&text, "").into_owned())
}

pub fn parse_csv(bytes: &[u8]) -> Result<DataTable, IngestionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(IngestionError::EmptyCsv);
    }

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;

    Ok(DataTable { headers, rows })
}

/// Reads every PDF and CSV in a directory, sorted by name. Other files are ignored.
pub fn scan_dir(dir: &Path) -> Result<Vec<UploadedDocument>, IngestionError> {
    if !dir.is_dir() {
        return Err(IngestionError::MissingDir(dir.to_path_buf()));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let mut documents = Vec::new();
    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let Some(kind) = DocumentKind::from_name(&name) else {
            tracing::debug!("Ignoring unsupported file {}", name);
            continue;
        };
        documents.push(UploadedDocument::new(name, kind, std::fs::read(&path)?));
    }

    tracing::debug!("Found {} documents in {}", documents.len(), dir.display());
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVENUE_CSV: &str = "Year,Revenue,Profit\n2021,100,20\n2022,150,30\n2023,200,45\n";

    fn csv_doc(name: &str, content: &str) -> UploadedDocument {
        UploadedDocument::new(name, DocumentKind::Csv, content.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_csv() {
        let table = parse_csv(REVENUE_CSV.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Year", "Revenue", "Profit"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2], vec!["2023", "200", "45"]);
    }

    #[test]
    fn test_parse_csv_ragged_rows() {
        let result = parse_csv(b"a,b\n1,2\n3\n");
        assert!(matches!(result, Err(IngestionError::Csv(_))));
    }

    #[test]
    fn test_parse_csv_without_header() {
        assert!(matches!(parse_csv(b""), Err(IngestionError::EmptyCsv)));
    }

    #[test]
    fn test_bad_pdf_does_not_abort_batch() {
        let corpus = ingest(vec![
            UploadedDocument::new("broken.pdf", DocumentKind::Pdf, b"not a pdf".to_vec()),
            csv_doc("revenue.csv", REVENUE_CSV),
        ]);

        assert_eq!(corpus.documents.len(), 1);
        assert_eq!(corpus.documents[0].name, "revenue.csv");
        assert_eq!(corpus.failures.len(), 1);
        assert_eq!(corpus.failures[0].0, "broken.pdf");
    }

    #[test]
    fn test_context_blob_sections() {
        let corpus = ingest(vec![csv_doc("revenue.csv", REVENUE_CSV)]);
        let blob = corpus.context_blob();
        assert!(blob.starts_with("\n\n### From revenue.csv:\n"));
        assert!(blob.contains("Year Revenue Profit"));
        assert!(blob.contains("2023     200     45"));
    }

    #[test]
    fn test_empty_corpus_is_no_data() {
        let corpus = ingest(vec![]);
        assert!(corpus.is_empty());
        assert!(corpus.first_table().is_none());
    }

    #[test]
    fn test_first_table_is_first_csv() {
        let corpus = ingest(vec![
            csv_doc("names.csv", "Name,City\nAda,London\n"),
            csv_doc("revenue.csv", REVENUE_CSV),
        ]);
        assert_eq!(corpus.first_table().unwrap().headers, vec!["Name", "City"]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let result = scan_dir(Path::new("definitely/not/here"));
        assert!(matches!(result, Err(IngestionError::MissingDir(_))));
    }

    #[test]
    fn test_scan_dir_skips_unsupported() {
        let dir = std::env::temp_dir().join(format!("fin-insights-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.csv"), REVENUE_CSV).unwrap();
        std::fs::write(dir.join("a.txt"), "ignored").unwrap();
        std::fs::write(dir.join("a.pdf"), "%PDF-broken").unwrap();

        let docs = scan_dir(&dir).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.csv"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
