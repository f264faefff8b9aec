//! Shared test doubles.

use crate::api::{ChatCompletion, ChatRequest};
use crate::config::{AppConfig, DataPaths, PipelineSettings};
use crate::error::LlmError;
use axum::Router;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// Default configuration rooted at `dir`.
pub fn config_in(dir: &Path) -> AppConfig {
    AppConfig {
        paths: DataPaths::new(dir),
        settings: PipelineSettings::default(),
        secrets_env: Default::default(),
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A chat client that replays canned results and records every request.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        ScriptedChat {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatCompletion for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyCompletion))
    }
}
