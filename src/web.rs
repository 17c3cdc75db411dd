use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use askama::Template;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::completion::GroqClient;
use crate::config::Config;
use crate::error::CompletionError;
use crate::ingest::{self, Corpus};
use crate::models::{ChatTurn, DocumentKind, UploadedDocument};
use crate::pipeline::{self, AskOutcome, ChartSource, Session};

const SESSION_COOKIE_NAME: &str = "session_id";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const PREVIEW_ROWS: usize = 5;

type SharedSession = Arc<tokio::sync::Mutex<Session>>;

const MAX_SESSIONS: usize = 1_000;
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    session: SharedSession,
    last_seen: Instant,
}

// Application State
pub struct AppState {
    pub config: Config,
    pub client: GroqClient,
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, CompletionError> {
        let client = GroqClient::new(&config)?;
        Ok(Self {
            config,
            client,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Looks up the caller's session without creating one.
    fn find_session(&self, jar: &CookieJar) -> Option<SharedSession> {
        let id = jar
            .get(SESSION_COOKIE_NAME)
            .and_then(|c| Uuid::parse_str(c.value()).ok())?;
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    /// Looks up the caller's session, creating one seeded from the uploads
    /// directory when the cookie is missing or unknown.
    async fn session(&self, jar: CookieJar) -> (CookieJar, SharedSession, Vec<Notice>) {
        if let Some(session) = self.find_session(&jar) {
            return (jar, session, vec![]);
        }

        let (corpus, notices) = self.seed_corpus().await;
        let id = Uuid::new_v4();
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(corpus)));
        self.insert_session(id, session.clone());
        tracing::info!("Started session {}", id);

        let cookie = Cookie::build((SESSION_COOKIE_NAME, id.to_string()))
            .path("/")
            .http_only(true)
            .build();

        (jar.add(cookie), session, notices)
    }

    fn insert_session(&self, id: Uuid, session: SharedSession) {
        self.insert_session_at(id, session, Instant::now());
    }

    /// Drops idle sessions and, at capacity, the least recently used one.
    fn insert_session_at(&self, id: Uuid, session: SharedSession, now: Instant) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, entry| {
            now.saturating_duration_since(entry.last_seen) < SESSION_IDLE_TIMEOUT
        });

        if sessions.len() >= MAX_SESSIONS {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                tracing::debug!("Evicting session {}", oldest);
                sessions.remove(&oldest);
            }
        }

        sessions.insert(
            id,
            SessionEntry {
                session,
                last_seen: now,
            },
        );
    }

    async fn seed_corpus(&self) -> (Corpus, Vec<Notice>) {
        let dir = self.config.uploads_dir.clone();
        let scanned = tokio::task::spawn_blocking(move || {
            ingest::scan_dir(&dir).map(ingest::ingest)
        })
        .await;

        match scanned {
            Ok(Ok(corpus)) => {
                let notices = failure_notices(&corpus);
                (corpus, notices)
            }
            Ok(Err(e)) => {
                tracing::warn!("Not loading uploads directory: {}", e);
                (Corpus::default(), vec![Notice::info(e.to_string())])
            }
            Err(e) => {
                tracing::error!("Uploads directory scan panicked: {}", e);
                let notice = Notice::error("Could not load the uploads directory.");
                (Corpus::default(), vec![notice])
            }
        }
    }
}

// Templates
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    model: String,
    documents: Vec<DocumentView>,
    turns: Vec<TurnView>,
    sidebar: Vec<SidebarItem>,
    selected: Option<TurnView>,
    chart: Option<ChartView>,
    chart_warnings: Vec<String>,
    notices: Vec<Notice>,
}

// Data structures
#[derive(Clone)]
struct Notice {
    level: &'static str,
    text: String,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            level: "info",
            text: text.into(),
        }
    }

    fn warning(text: impl Into<String>) -> Self {
        Self {
            level: "warning",
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: "error",
            text: text.into(),
        }
    }
}

#[derive(Clone)]
struct DocumentView {
    name: String,
    kind: String,
    headers: Vec<String>,
    preview: Vec<Vec<String>>,
}

#[derive(Clone)]
struct TurnView {
    question: String,
    answer: String,
    raw_answer: String,
    asked_at: String,
}

impl TurnView {
    fn new(turn: &ChatTurn) -> Self {
        Self {
            question: turn.question.clone(),
            answer: turn.answer.clone(),
            raw_answer: turn.raw_answer.clone(),
            asked_at: turn.asked_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

#[derive(Clone)]
struct SidebarItem {
    index: usize,
    label: String,
    active: bool,
}

#[derive(Clone)]
struct ChartView {
    heading: String,
    figure_json: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

// Form payloads
#[derive(Deserialize)]
struct AskForm {
    question: String,
}

fn failure_notices(corpus: &Corpus) -> Vec<Notice> {
    corpus
        .failures
        .iter()
        .map(|(name, reason)| Notice::warning(format!("Could not read {}: {}", name, reason)))
        .collect()
}

fn render_page(state: &AppState, session: &Session, notices: Vec<Notice>) -> IndexTemplate {
    let documents = session
        .corpus
        .documents
        .iter()
        .map(|doc| DocumentView {
            name: doc.name.clone(),
            kind: doc.kind.to_string(),
            headers: doc.table.as_ref().map(|t| t.headers.clone()).unwrap_or_default(),
            preview: doc
                .table
                .as_ref()
                .map(|t| t.rows.iter().take(PREVIEW_ROWS).cloned().collect())
                .unwrap_or_default(),
        })
        .collect();

    let turns = session
        .history
        .turns()
        .iter()
        .map(TurnView::new)
        .collect();

    let selected_index = session.history.selected_index();
    let sidebar = session
        .history
        .turns()
        .iter()
        .enumerate()
        .map(|(i, t)| SidebarItem {
            index: i,
            label: format!("Q{}: {}", i + 1, t.question),
            active: selected_index == Some(i),
        })
        .collect();

    let selected = session.history.selected().map(TurnView::new);

    let (chart, chart_warnings) = match &session.latest_chart {
        Some(outcome) => {
            let view = outcome.spec.as_ref().map(|spec| {
                let heading = match outcome.source {
                    ChartSource::Structured => "Visualization (from AI-generated data)",
                    ChartSource::Fallback => "Visualization (based on CSV)",
                };
                // Keep "</script>" in the data from closing the script tag early
                let figure_json = spec.to_plotly().to_string().replace("</", "<\\/");
                let (columns, rows) = match outcome.source {
                    ChartSource::Structured => (spec.column_names(), spec.table_rows()),
                    ChartSource::Fallback => (vec![], vec![]),
                };
                ChartView {
                    heading: heading.to_string(),
                    figure_json,
                    columns,
                    rows,
                }
            });
            (view, outcome.warnings.clone())
        }
        None => (None, vec![]),
    };

    IndexTemplate {
        model: state.config.model.clone(),
        documents,
        turns,
        sidebar,
        selected,
        chart,
        chart_warnings,
        notices,
    }
}

// Handlers
async fn index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, session, notices) = state.session(jar).await;
    let session = session.lock().await;
    let mut notices = notices;
    if session.corpus.is_empty() {
        notices.push(Notice::info(
            "Please upload at least one PDF or CSV file to begin.",
        ));
    }
    (jar, HtmlTemplate(render_page(&state, &session, notices))).into_response()
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    let (jar, session, mut notices) = state.session(jar).await;

    let mut documents = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Malformed upload: {}", e);
                notices.push(Notice::error(format!("Upload failed: {}", e)));
                break;
            }
        };

        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let Some(kind) = DocumentKind::from_name(&name) else {
            tracing::debug!("Ignoring unsupported upload {}", name);
            continue;
        };

        match field.bytes().await {
            Ok(bytes) => documents.push(UploadedDocument::new(name, kind, bytes.to_vec())),
            Err(e) => {
                tracing::warn!("Failed to read upload {}: {}", name, e);
                notices.push(Notice::warning(format!("Could not read {}: {}", name, e)));
            }
        }
    }

    let batch = if documents.is_empty() {
        None
    } else {
        match tokio::task::spawn_blocking(move || ingest::ingest(documents)).await {
            Ok(batch) => Some(batch),
            Err(e) => {
                tracing::error!("Ingestion task panicked: {}", e);
                notices.push(Notice::error("Could not process the uploaded files."));
                None
            }
        }
    };

    let mut session = session.lock().await;
    if let Some(batch) = batch {
        notices.extend(failure_notices(&batch));
        if !batch.documents.is_empty() {
            notices.push(Notice::info(format!(
                "Loaded {} file(s).",
                batch.documents.len()
            )));
        }
        session.corpus.extend(batch);
    } else if notices.is_empty() {
        notices.push(Notice::info("No PDF or CSV files in the upload."));
    }

    (jar, HtmlTemplate(render_page(&state, &session, notices))).into_response()
}

async fn ask_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<AskForm>,
) -> Response {
    let (jar, session, mut notices) = state.session(jar).await;
    let mut session = session.lock().await;

    match pipeline::ask(
        &mut session,
        &state.client,
        state.config.response_format,
        &form.question,
    )
    .await
    {
        Ok(AskOutcome::Answered { .. }) => {}
        Ok(AskOutcome::Duplicate) => {
            tracing::debug!("Question already answered");
        }
        Err(e) => notices.push(Notice::error(e.to_string())),
    }

    (jar, HtmlTemplate(render_page(&state, &session, notices))).into_response()
}

async fn select_history_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(index): Path<usize>,
) -> Response {
    let Some(session) = state.find_session(&jar) else {
        return (StatusCode::NOT_FOUND, "No session").into_response();
    };
    let mut session = session.lock().await;
    if session.history.select(index).is_none() {
        return (StatusCode::NOT_FOUND, jar, "No such question").into_response();
    }
    (jar, Redirect::to("/")).into_response()
}

async fn chart_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(session) = state.find_session(&jar) else {
        return (StatusCode::NOT_FOUND, "No chart yet").into_response();
    };
    let session = session.lock().await;

    match session
        .latest_chart
        .as_ref()
        .and_then(|outcome| outcome.spec.as_ref())
    {
        Some(spec) => (jar, Json(spec.to_plotly())).into_response(),
        None => (StatusCode::NOT_FOUND, jar, "No chart yet").into_response(),
    }
}

// Template wrapper to handle errors
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template. Error: {}", err),
            )
                .into_response(),
        }
    }
}

// Router setup
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload_handler))
        .route("/ask", post(ask_handler))
        .route("/history/:index", get(select_history_handler))
        .route("/api/chart", get(chart_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
