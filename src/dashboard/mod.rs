//! Read-only dashboard over the analyzed articles and the final report.
//!
//! Both artifacts are loaded once at start-up and shared immutably between
//! requests. The server never writes files and never calls the LLM.
//!
//! Routes:
//! - `GET /`: HTML page, filtered by repeated `source` / `sentiment` parameters
//! - `GET /api/articles`: the filtered articles as JSON
//! - `GET /api/report`: the report as JSON
//! - `GET /healthz`: liveness probe

pub mod filter;
pub mod render;
pub mod stats;

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{AnalyzedArticle, Report};
use crate::outputs::json::read_artifact;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use filter::{Selection, known_sources};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Everything the handlers read.
#[derive(Debug)]
pub struct AppState {
    pub articles: Vec<AnalyzedArticle>,
    pub report: Report,
    pub sources: BTreeSet<String>,
}

impl AppState {
    pub fn new(articles: Vec<AnalyzedArticle>, report: Report) -> Self {
        let sources = known_sources(&articles);
        AppState {
            articles,
            report,
            sources,
        }
    }

    /// Load both artifacts; a missing or undecodable file is an error naming its path.
    #[instrument(level = "info", skip_all)]
    pub async fn load(config: &AppConfig) -> Result<Self> {
        let articles: Vec<AnalyzedArticle> = read_artifact(&config.paths.analyzed_articles).await?;
        let report: Report = read_artifact(&config.paths.final_report).await?;
        info!(articles = articles.len(), "Loaded dashboard data");
        Ok(AppState::new(articles, report))
    }
}

async fn index(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> impl IntoResponse {
    let selection = Selection::from_query(query.as_deref(), &state.sources);
    match render::render_page(&state, &selection) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render dashboard");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn articles(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Json<Vec<AnalyzedArticle>> {
    let selection = Selection::from_query(query.as_deref(), &state.sources);
    Json(selection.apply(&state.articles).into_iter().cloned().collect())
}

async fn report(State(state): State<Arc<AppState>>) -> Json<Report> {
    Json(state.report.clone())
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/articles", get(articles))
        .route("/api/report", get(report))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the artifacts and serve the dashboard until the process is stopped.
pub async fn serve(config: &AppConfig, bind: SocketAddr) -> Result<()> {
    let state = Arc::new(AppState::load(config).await?);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Dashboard listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
