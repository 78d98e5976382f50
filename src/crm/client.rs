//! HTTP client for a running helpdesk server.
//!
//! Implements [`TicketStore`] and [`BoardReader`] over the REST API so the
//! CLI board client can run the placement engine locally, the same way a
//! browser board view would.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::api::Envelope;
use super::models::{KanbanColumn, Ticket, TicketPatch};
use super::placement::BoardSnapshot;
use super::store::{BoardReader, TicketStore};
use crate::errors::StoreError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let resp = self
            .http
            .get(self.url(path))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("GET {} failed: {}", path, e)))?;
        unwrap_envelope(resp, None).await
    }
}

/// Decode the `{success, data, error}` envelope into `T` or a [`StoreError`].
async fn unwrap_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
    ticket_id: Option<Uuid>,
) -> Result<T, StoreError> {
    let status = resp.status();
    let envelope: Envelope<T> = resp.json().await.map_err(|e| {
        StoreError::Unavailable(format!("Unreadable response (HTTP {}): {}", status, e))
    })?;

    if envelope.success {
        if let Some(data) = envelope.data {
            return Ok(data);
        }
    }
    let message = envelope
        .error
        .map(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {}", status));

    Err(match (status, ticket_id) {
        (reqwest::StatusCode::NOT_FOUND, Some(id)) => StoreError::NotFound { id },
        (s, _) if s.is_client_error() => StoreError::Rejected(message),
        _ => StoreError::Unavailable(message),
    })
}

#[async_trait]
impl TicketStore for ApiClient {
    async fn update_ticket(&self, id: Uuid, patch: TicketPatch) -> Result<Ticket, StoreError> {
        let path = format!("/api/tickets/{}", id);
        let resp = self
            .http
            .patch(self.url(&path))
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("PATCH {} failed: {}", path, e)))?;
        unwrap_envelope(resp, Some(id)).await
    }
}

#[async_trait]
impl BoardReader for ApiClient {
    async fn list_columns(&self) -> Result<Vec<KanbanColumn>, StoreError> {
        self.get("/api/kanban-columns").await
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        self.get("/api/tickets").await
    }

    async fn load_board(&self) -> Result<BoardSnapshot, StoreError> {
        self.get("/api/board").await
    }
}
