use crate::chart::ChartSpec;
use crate::completion::CompletionClient;
use crate::error::{AskError, ExtractionError};
use crate::history::History;
use crate::ingest::Corpus;
use crate::models::ChatTurn;
use crate::prompt::{build_prompt, ResponseFormat};
use crate::response::{extract, StructuredRecord};

/// Where a chart came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartSource {
    /// Data the model returned.
    Structured,
    /// The first uploaded CSV, chosen by question keywords.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutcome {
    pub source: ChartSource,
    pub spec: Option<ChartSpec>,
    pub warnings: Vec<String>,
}

/// Per-user state. Owned by the interaction layer and lent to each run.
#[derive(Debug, Default)]
pub struct Session {
    pub corpus: Corpus,
    pub history: History,
    pub latest_chart: Option<ChartOutcome>,
}

impl Session {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            corpus,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub enum AskOutcome {
    /// Same as the previous question; nothing was sent.
    Duplicate,
    Answered {
        turn: ChatTurn,
        chart: Option<ChartOutcome>,
    },
}

/// Runs one question through prompt, completion, extraction and chart selection.
pub async fn ask<C: CompletionClient>(
    session: &mut Session,
    client: &C,
    format: ResponseFormat,
    question: &str,
) -> Result<AskOutcome, AskError> {
    if question.trim().is_empty() {
        return Err(AskError::EmptyQuestion);
    }
    if session.history.is_repeat(question) {
        tracing::info!("Skipping repeated question");
        return Ok(AskOutcome::Duplicate);
    }
    if session.corpus.is_empty() {
        return Err(AskError::NoData);
    }

    tracing::info!("Answering: \"{}\"", question);
    let prompt = build_prompt(format, &session.corpus.context_blob(), question);
    let raw_answer = client.complete(&prompt).await.map_err(|e| {
        tracing::error!("Completion failed: {}", e);
        e
    })?;

    let extraction = extract(format, &raw_answer);
    let chart = select_chart(&session.corpus, extraction.record, question);

    let turn = ChatTurn::new(question.to_string(), extraction.answer, raw_answer);
    session.history.push(turn.clone());
    session.latest_chart = chart.clone();

    Ok(AskOutcome::Answered { turn, chart })
}

fn select_chart(
    corpus: &Corpus,
    record: Result<StructuredRecord, ExtractionError>,
    question: &str,
) -> Option<ChartOutcome> {
    let mut warnings = Vec::new();

    match record {
        Ok(record) => match ChartSpec::from_record(&record) {
            Ok(spec) => {
                return Some(ChartOutcome {
                    source: ChartSource::Structured,
                    spec: Some(spec),
                    warnings,
                })
            }
            Err(e) => {
                tracing::warn!("Structured chart data unusable: {}", e);
                warnings.push(format!("Invalid chart data from the model: {}", e));
            }
        },
        Err(e) => tracing::debug!("Falling back to CSV chart: {}", e),
    }

    let Some(table) = corpus.first_table() else {
        return (!warnings.is_empty()).then(|| ChartOutcome {
            source: ChartSource::Structured,
            spec: None,
            warnings,
        });
    };

    let spec = match ChartSpec::from_table(table, question) {
        Ok(spec) => Some(spec),
        Err(e) => {
            tracing::warn!("Fallback chart skipped: {}", e);
            warnings.push(e.to_string());
            None
        }
    };

    Some(ChartOutcome {
        source: ChartSource::Fallback,
        spec,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartType;
    use crate::error::CompletionError;
    use crate::ingest::ingest;
    use crate::models::{DocumentKind, UploadedDocument};
    use crate::prompt::Prompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedClient {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl CannedClient {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompletionClient for CannedClient {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or(CompletionError::EmptyResponse)
        }
    }

    fn revenue_session() -> Session {
        Session::new(ingest(vec![UploadedDocument::new(
            "revenue.csv",
            DocumentKind::Csv,
            b"Year,Revenue,Profit\n2021,100,20\n2022,150,30\n2023,200,45\n".to_vec(),
        )]))
    }

    #[tokio::test]
    async fn test_structured_answer() {
        let mut session = revenue_session();
        let client = CannedClient::replying(
            r#"<answer>Revenue grew 20%.</answer><json>{"chart_type":"bar","Year":[2021,2022],"Revenue":[100,120]}</json>"#,
        );

        let outcome = ask(&mut session, &client, ResponseFormat::Tagged, "How did revenue change?")
            .await
            .unwrap();

        let AskOutcome::Answered { turn, chart } = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(turn.answer, "Revenue grew 20%.");

        let chart = chart.unwrap();
        assert_eq!(chart.source, ChartSource::Structured);
        let spec = chart.spec.unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.y.len(), 1);
        assert_eq!(session.history.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_chart_when_no_structured_data() {
        let mut session = revenue_session();
        let client = CannedClient::replying("<answer>Revenue went up every year.</answer>");

        let outcome = ask(
            &mut session,
            &client,
            ResponseFormat::Tagged,
            "show the trend of revenue over time",
        )
        .await
        .unwrap();

        let AskOutcome::Answered { chart, .. } = outcome else {
            panic!("expected an answer");
        };
        let chart = chart.unwrap();
        assert_eq!(chart.source, ChartSource::Fallback);
        let spec = chart.spec.unwrap();
        assert_eq!(spec.chart_type, ChartType::Line);
        assert_eq!(spec.x.name, "Year");
        let y: Vec<_> = spec.y.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(y, vec!["Revenue", "Profit"]);
    }

    #[tokio::test]
    async fn test_bad_record_falls_back_with_warning() {
        let mut session = revenue_session();
        let client = CannedClient::replying(
            r#"<answer>ok</answer><json>{"chart_type":"pie","Segment":["A"]}</json>"#,
        );

        let outcome = ask(&mut session, &client, ResponseFormat::Tagged, "q")
            .await
            .unwrap();
        let AskOutcome::Answered { chart, .. } = outcome else {
            panic!("expected an answer");
        };
        let chart = chart.unwrap();
        assert_eq!(chart.source, ChartSource::Fallback);
        assert!(chart.spec.is_some());
        assert_eq!(chart.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_question_skips_completion() {
        let mut session = revenue_session();
        let client = CannedClient::replying("<answer>fine</answer>");

        ask(&mut session, &client, ResponseFormat::Tagged, "same?")
            .await
            .unwrap();
        let second = ask(&mut session, &client, ResponseFormat::Tagged, "same?")
            .await
            .unwrap();

        assert!(matches!(second, AskOutcome::Duplicate));
        assert_eq!(client.calls(), 1);
        assert_eq!(session.history.len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_appends_nothing() {
        let mut session = revenue_session();
        let client = CannedClient::failing();

        let result = ask(&mut session, &client, ResponseFormat::Tagged, "q").await;
        assert!(matches!(result, Err(AskError::Completion(_))));
        assert!(session.history.is_empty());
        assert!(session.latest_chart.is_none());
    }

    #[tokio::test]
    async fn test_no_data() {
        let mut session = Session::default();
        let client = CannedClient::replying("unused");

        let result = ask(&mut session, &client, ResponseFormat::Tagged, "q").await;
        assert!(matches!(result, Err(AskError::NoData)));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_pdf_only_corpus_has_no_chart() {
        let mut session = Session::default();
        session.corpus.documents.push(crate::models::IngestedDocument {
            name: "report.pdf".to_string(),
            kind: DocumentKind::Pdf,
            text: "Revenue was 100.".to_string(),
            table: None,
        });
        let client = CannedClient::replying("Revenue was 100.");

        let outcome = ask(&mut session, &client, ResponseFormat::Bare, "revenue?")
            .await
            .unwrap();
        let AskOutcome::Answered { turn, chart } = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(turn.answer, "Revenue was 100.");
        assert!(chart.is_none());
    }
}
