//! # Remote Execution
//!
//! The engine hands every claimed operation to a `RemoteExecutor`. What an
//! operation does remotely is up to the deployment: register handlers per
//! kind with `ExecutorRegistry`, or replay operations against a REST API
//! with `RestExecutor`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::offline::queue::OperationKind;
use crate::shared::error::ExecutionError;

/// Executes one operation against the remote side
#[async_trait]
pub trait RemoteExecutor: Send + Sync + fmt::Debug {
    async fn execute(&self, kind: &OperationKind, payload: &Value) -> Result<(), ExecutionError>;
}

/// Boxed future returned by registry handlers
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), ExecutionError>> + Send>>;

type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Dispatches operations to a handler registered for their kind
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    handlers: HashMap<OperationKind, Handler>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `kind`, replacing any previous one
    pub fn register<F, Fut>(&mut self, kind: impl Into<OperationKind>, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Builder-style `register`
    pub fn with<F, Fut>(mut self, kind: impl Into<OperationKind>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        self.register(kind, handler);
        self
    }

    pub fn contains(&self, kind: &OperationKind) -> bool {
        self.handlers.contains_key(kind)
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(OperationKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ExecutorRegistry").field("kinds", &kinds).finish()
    }
}

#[async_trait]
impl RemoteExecutor for ExecutorRegistry {
    async fn execute(&self, kind: &OperationKind, payload: &Value) -> Result<(), ExecutionError> {
        let handler = self
            .handlers
            .get(kind)
            .ok_or_else(|| ExecutionError::UnsupportedKind(kind.to_string()))?;
        handler(payload.clone()).await
    }
}

/// Replays operations as `POST {base_url}/{kind}` with a JSON body
#[derive(Debug, Clone)]
pub struct RestExecutor {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Endpoint an operation kind is posted to
    pub fn endpoint(&self, kind: &OperationKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str().trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteExecutor for RestExecutor {
    async fn execute(&self, kind: &OperationKind, payload: &Value) -> Result<(), ExecutionError> {
        let url = self.endpoint(kind);
        let mut request = self.client.post(&url).json(payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() || e.is_request() {
                ExecutionError::network(e.to_string())
            } else {
                ExecutionError::other(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("[Executor] POST {} -> {}", url, status);
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(ExecutionError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
