use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::db::DbHandle;
#[cfg(test)]
use super::db::CrmDb;
use super::placement::{MoveOutcome, MoveRequest, PlacementEngine};
use super::store::DbTicketStore;
use super::validation::{
    CreateColumnRequest, CreateCustomerRequest, CreateMessageRequest, CreateTicketRequest,
    PatchTicketRequest, PlacementPatch, UpdateColumnRequest, UpdateCustomerRequest,
    UpdateTicketRequest,
};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::{CrmError, FieldError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub engine: PlacementEngine<DbTicketStore>,
}

impl AppState {
    pub fn new(db: DbHandle, ws_tx: broadcast::Sender<String>) -> Self {
        let engine = PlacementEngine::new(DbTicketStore::new(db.clone()));
        Self { db, ws_tx, engine }
    }
}

pub type SharedState = Arc<AppState>;

// ── Response envelope ─────────────────────────────────────────────────

/// Every JSON route answers with `{"success": true, "data": ...}` or
/// `{"success": false, "error": {...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
}

fn failure(
    status: StatusCode,
    code: &str,
    message: String,
    details: Option<serde_json::Value>,
) -> Response {
    let body: Envelope<()> = Envelope {
        success: false,
        data: None,
        error: Some(ErrorBody {
            message,
            code: code.to_string(),
            details,
        }),
    };
    (status, Json(body)).into_response()
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    Conflict(String),
    Database(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => failure(StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::Validation { message, fields } => failure(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                message,
                serde_json::to_value(fields).ok(),
            ),
            ApiError::Conflict(msg) => failure(StatusCode::CONFLICT, "CONFLICT", msg, None),
            ApiError::Database(msg) => failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                msg,
                None,
            ),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<CrmError>() {
            Some(CrmError::Validation(fields)) => ApiError::Validation {
                message: err.to_string(),
                fields: fields.clone(),
            },
            Some(e) if e.is_not_found() => ApiError::NotFound(e.to_string()),
            Some(e @ CrmError::ColumnInUse { .. }) => ApiError::Conflict(e.to_string()),
            _ => {
                tracing::error!(error = %format!("{:#}", err), "database request failed");
                ApiError::Database(err.to_string())
            }
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        anyhow::Error::from(err).into()
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        CrmError::invalid("id", format!("Invalid id: {}", raw)).into()
    })
}

/// JSON body extractor whose rejections use the error envelope.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let field = FieldError::new("body", rejection.body_text());
                Err(ApiError::Validation {
                    message: format!("Invalid data: {}", field.message),
                    fields: vec![field],
                })
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/customers", get(list_customers).post(create_customer))
        .route(
            "/api/customers/{id}",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/api/customers/{id}/tickets", get(list_customer_tickets))
        .route("/api/kanban-columns", get(list_columns).post(create_column))
        .route(
            "/api/kanban-columns/{id}",
            axum::routing::put(update_column).delete(delete_column),
        )
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/open", get(list_open_tickets))
        .route(
            "/api/tickets/{id}",
            get(get_ticket)
                .put(update_ticket)
                .patch(patch_ticket)
                .delete(delete_ticket),
        )
        .route(
            "/api/tickets/{id}/messages",
            get(list_messages).post(create_message),
        )
        .route("/api/tickets/{id}/events", get(list_events))
        .route("/api/board", get(get_board))
        .route("/api/board/moves", post(execute_move))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_customers(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let customers = state.db.call(|db| db.list_customers()).await?;
    Ok(ok(customers))
}

async fn create_customer(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = req.validate()?;
    let customer = state.db.call(move |db| db.create_customer(&new)).await?;
    tracing::info!(customer_id = %customer.id, "customer created");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CustomerCreated {
            customer: customer.clone(),
        },
    );
    Ok((StatusCode::CREATED, ok(customer)))
}

async fn get_customer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let customer = state.db.call(move |db| db.get_customer(id)).await?;
    match customer {
        Some(customer) => Ok(ok(customer)),
        None => Err(CrmError::CustomerNotFound { id }.into()),
    }
}

async fn update_customer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let changes = req.validate()?;
    let customer = state
        .db
        .call(move |db| db.update_customer(id, &changes))
        .await?;
    Ok(ok(customer))
}

async fn delete_customer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let deleted = state.db.call(move |db| db.delete_customer(id)).await?;
    match deleted {
        true => {
            tracing::info!(customer_id = %id, "customer deleted");
            Ok(ok(serde_json::json!({ "id": id })))
        }
        false => Err(CrmError::CustomerNotFound { id }.into()),
    }
}

async fn list_customer_tickets(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let tickets = state
        .db
        .call(move |db| {
            db.get_customer(id)?
                .ok_or(CrmError::CustomerNotFound { id })?;
            db.list_tickets_by_customer(id)
        })
        .await?;
    Ok(ok(tickets))
}

async fn list_columns(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let columns = state.db.call(|db| db.list_columns()).await?;
    Ok(ok(columns))
}

async fn broadcast_columns(state: &SharedState) {
    match state.db.call(|db| db.list_columns()).await {
        Ok(columns) => broadcast_message(&state.ws_tx, &WsMessage::ColumnsChanged { columns }),
        Err(e) => tracing::warn!(error = %e, "failed to reload columns for broadcast"),
    }
}

async fn create_column(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = req.validate()?;
    let column = state.db.call(move |db| db.create_column(&new)).await?;
    broadcast_columns(&state).await;
    Ok((StatusCode::CREATED, ok(column)))
}

async fn update_column(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let changes = req.validate()?;
    let column = state
        .db
        .call(move |db| db.update_column(id, &changes))
        .await?;
    broadcast_columns(&state).await;
    Ok(ok(column))
}

async fn delete_column(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let deleted = state.db.call(move |db| db.delete_column(id)).await?;
    if !deleted {
        return Err(CrmError::ColumnNotFound { id }.into());
    }
    broadcast_columns(&state).await;
    Ok(ok(serde_json::json!({ "id": id })))
}

async fn list_tickets(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .db
        .call(|db| db.list_tickets_with_relations())
        .await?;
    Ok(ok(tickets))
}

async fn list_open_tickets(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state.db.call(|db| db.list_open_ticket_details()).await?;
    Ok(ok(tickets))
}

async fn create_ticket(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = req.validate()?;
    let ticket = state.db.call(move |db| db.create_ticket(&new)).await?;
    tracing::info!(
        ticket_id = %ticket.id,
        column_id = %ticket.kanban_column_id,
        status = %ticket.status,
        "ticket created"
    );
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketCreated {
            ticket: ticket.clone(),
        },
    );
    Ok((StatusCode::CREATED, ok(ticket)))
}

async fn get_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let detail = state.db.call(move |db| db.get_ticket_detail(id)).await?;
    match detail {
        Some(detail) => Ok(ok(detail)),
        None => Err(CrmError::TicketNotFound { id }.into()),
    }
}

async fn update_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let changes = req.validate()?;
    let ticket = state
        .db
        .call(move |db| db.update_ticket(id, &changes))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TicketUpdated {
            ticket: ticket.clone(),
        },
    );
    Ok(ok(ticket))
}

async fn patch_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PatchTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let placement = req.validate()?;
    let (from_column_id, ticket) = state
        .db
        .call(move |db| {
            // Capture the original column before the move for the WsMessage
            let from = db
                .get_ticket(id)?
                .ok_or(CrmError::TicketNotFound { id })?
                .kanban_column_id;
            let ticket = db.apply_placement(id, &placement)?;
            Ok((from, ticket))
        })
        .await?;

    match placement {
        PlacementPatch::Column { .. } => broadcast_message(
            &state.ws_tx,
            &WsMessage::TicketMoved {
                ticket_id: ticket.id,
                from_column_id,
                to_column_id: ticket.kanban_column_id,
                order_in_column: ticket.order_in_column,
                status: ticket.status,
            },
        ),
        PlacementPatch::Order { .. } => broadcast_message(
            &state.ws_tx,
            &WsMessage::TicketUpdated {
                ticket: ticket.clone(),
            },
        ),
    }
    Ok(ok(ticket))
}

async fn delete_ticket(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let deleted = state.db.call(move |db| db.delete_ticket(id)).await?;
    match deleted {
        true => {
            broadcast_message(&state.ws_tx, &WsMessage::TicketDeleted { ticket_id: id });
            Ok(ok(serde_json::json!({ "id": id })))
        }
        false => Err(CrmError::TicketNotFound { id }.into()),
    }
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let messages = state
        .db
        .call(move |db| {
            db.get_ticket(id)?.ok_or(CrmError::TicketNotFound { id })?;
            db.list_messages(id)
        })
        .await?;
    Ok(ok(messages))
}

async fn create_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let new = req.validate()?;
    let message = state.db.call(move |db| db.add_message(id, &new)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::MessageAdded {
            message: message.clone(),
        },
    );
    Ok((StatusCode::CREATED, ok(message)))
}

async fn list_events(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let events = state
        .db
        .call(move |db| {
            db.get_ticket(id)?.ok_or(CrmError::TicketNotFound { id })?;
            db.list_events(id)
        })
        .await?;
    Ok(ok(events))
}

async fn get_board(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let board = state.db.call(|db| db.get_board()).await?;
    Ok(ok(board))
}

/// Run a move through the placement engine against a fresh board snapshot.
async fn execute_move(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<MoveRequest>,
) -> Result<Response, ApiError> {
    let mut snapshot = state.db.call(|db| db.get_board()).await?;
    let from_column_id = snapshot
        .ticket(request.ticket_id())
        .map(|t| t.kanban_column_id);

    let outcome = state.engine.execute(&mut snapshot, &request).await;

    if let MoveOutcome::Applied { tickets } = &outcome {
        let msg = match request {
            MoveRequest::CrossColumn { .. } => tickets.first().map(|t| WsMessage::TicketMoved {
                ticket_id: t.id,
                from_column_id: from_column_id.unwrap_or(t.kanban_column_id),
                to_column_id: t.kanban_column_id,
                order_in_column: t.order_in_column,
                status: t.status,
            }),
            MoveRequest::Reorder { column_id, .. } => Some(WsMessage::TicketReordered {
                column_id,
                ticket_ids: tickets.iter().map(|t| t.id).collect(),
            }),
        };
        if let Some(msg) = msg {
            broadcast_message(&state.ws_tx, &msg);
        }
    }

    let rejection = match &outcome {
        MoveOutcome::Applied { .. } | MoveOutcome::Unchanged => None,
        MoveOutcome::NotFound { missing } => Some((
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Unknown ids in move: {}", join_ids(missing)),
        )),
        MoveOutcome::InFlight { ticket_id } => Some((
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Ticket {} already has a move in flight", ticket_id),
        )),
        MoveOutcome::Failed { failures, .. } => Some((
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_FAILURE",
            format!("{} ticket update(s) failed, reload the board", failures.len()),
        )),
    };
    match rejection {
        None => Ok(ok(outcome).into_response()),
        Some((status, code, message)) => {
            tracing::warn!(%code, %message, "move not applied");
            Ok(failure(status, code, message, serde_json::to_value(&outcome).ok()))
        }
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────
