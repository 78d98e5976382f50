//! Kanban placement engine.
//!
//! Turns drag gestures into ticket-store updates and keeps a caller-owned
//! [`BoardSnapshot`] consistent with what was persisted.
//!
//! Two kinds of move exist:
//!
//! | Move          | Calls | Patch per call                                   |
//! |---------------|-------|--------------------------------------------------|
//! | `CrossColumn` | 1     | `{kanban_column_id, order_in_column, status}`    |
//! | `Reorder`     | N     | `{order_in_column}` for every ticket in column   |
//!
//! All calls of a move run concurrently. The snapshot is only touched once
//! every call has succeeded, and then only with the records the store
//! returned. A partial failure leaves the snapshot exactly as it was; the
//! caller is expected to reload the board.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{KanbanColumn, Ticket, TicketPatch};
use super::status::derive_status;
use super::store::TicketStore;

/// Client-side view of the board: every column and every ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoardSnapshot {
    pub columns: Vec<KanbanColumn>,
    pub tickets: Vec<Ticket>,
}

impl BoardSnapshot {
    pub fn column(&self, id: Uuid) -> Option<&KanbanColumn> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn ticket(&self, id: Uuid) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    /// Tickets of one column ordered by `order_in_column`. Ties keep
    /// snapshot order.
    pub fn column_tickets(&self, column_id: Uuid) -> Vec<&Ticket> {
        let mut tickets: Vec<&Ticket> = self
            .tickets
            .iter()
            .filter(|t| t.kanban_column_id == column_id)
            .collect();
        tickets.sort_by_key(|t| t.order_in_column);
        tickets
    }

    /// Replace tickets with the given persisted records, matched by id.
    pub fn apply(&mut self, updated: &[Ticket]) {
        for record in updated {
            if let Some(slot) = self.tickets.iter_mut().find(|t| t.id == record.id) {
                *slot = record.clone();
            }
        }
    }
}

/// A validated drag-and-drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveRequest {
    CrossColumn {
        ticket_id: Uuid,
        target_column_id: Uuid,
    },
    Reorder {
        active_ticket_id: Uuid,
        over_ticket_id: Uuid,
        column_id: Uuid,
    },
}

impl MoveRequest {
    /// The ticket being dragged.
    pub fn ticket_id(&self) -> Uuid {
        match *self {
            Self::CrossColumn { ticket_id, .. } => ticket_id,
            Self::Reorder {
                active_ticket_id, ..
            } => active_ticket_id,
        }
    }
}

/// Resolve a drop of `active_id` over `over_id` (a column or a ticket).
/// Returns `None` when either id is unknown to the snapshot.
pub fn resolve_drop(snapshot: &BoardSnapshot, active_id: Uuid, over_id: Uuid) -> Option<MoveRequest> {
    let active = snapshot.ticket(active_id)?;
    if let Some(column) = snapshot.column(over_id) {
        return Some(MoveRequest::CrossColumn {
            ticket_id: active.id,
            target_column_id: column.id,
        });
    }
    let over = snapshot.ticket(over_id)?;
    if over.kanban_column_id == active.kanban_column_id {
        Some(MoveRequest::Reorder {
            active_ticket_id: active.id,
            over_ticket_id: over.id,
            column_id: active.kanban_column_id,
        })
    } else {
        Some(MoveRequest::CrossColumn {
            ticket_id: active.id,
            target_column_id: over.kanban_column_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketUpdate {
    pub ticket_id: Uuid,
    pub patch: TicketPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MovePlan {
    NoOp,
    Updates(Vec<TicketUpdate>),
}

/// Compute the store updates a move needs. `Err` carries the ids the
/// snapshot does not know about.
pub fn plan_move(snapshot: &BoardSnapshot, request: &MoveRequest) -> Result<MovePlan, Vec<Uuid>> {
    match *request {
        MoveRequest::CrossColumn {
            ticket_id,
            target_column_id,
        } => {
            let ticket = snapshot.ticket(ticket_id);
            let column = snapshot.column(target_column_id);
            let (ticket, column) = match (ticket, column) {
                (Some(t), Some(c)) => (t, c),
                (t, c) => {
                    let mut missing = Vec::new();
                    if t.is_none() {
                        missing.push(ticket_id);
                    }
                    if c.is_none() {
                        missing.push(target_column_id);
                    }
                    return Err(missing);
                }
            };
            if ticket.kanban_column_id == column.id {
                return Ok(MovePlan::NoOp);
            }

            let order = snapshot
                .tickets
                .iter()
                .filter(|t| t.kanban_column_id == column.id && t.id != ticket.id)
                .count() as i64;
            Ok(MovePlan::Updates(vec![TicketUpdate {
                ticket_id,
                patch: TicketPatch::placement(column.id, order, derive_status(&column.name)),
            }]))
        }
        MoveRequest::Reorder {
            active_ticket_id,
            over_ticket_id,
            column_id,
        } => {
            let mut ids: Vec<Uuid> = snapshot
                .column_tickets(column_id)
                .iter()
                .map(|t| t.id)
                .collect();
            let from = ids.iter().position(|id| *id == active_ticket_id);
            let to = ids.iter().position(|id| *id == over_ticket_id);
            let (from, to) = match (from, to) {
                (Some(f), Some(t)) => (f, t),
                (f, t) => {
                    let mut missing = Vec::new();
                    if f.is_none() {
                        missing.push(active_ticket_id);
                    }
                    if t.is_none() {
                        missing.push(over_ticket_id);
                    }
                    return Err(missing);
                }
            };
            if from == to {
                return Ok(MovePlan::NoOp);
            }

            let moved = ids.remove(from);
            ids.insert(to, moved);
            Ok(MovePlan::Updates(
                ids.into_iter()
                    .enumerate()
                    .map(|(index, ticket_id)| TicketUpdate {
                        ticket_id,
                        patch: TicketPatch::order(index as i64),
                    })
                    .collect(),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFailure {
    pub ticket_id: Uuid,
    pub error: String,
}

/// Result of running a move. Expected conditions are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    Applied { tickets: Vec<Ticket> },
    Unchanged,
    NotFound { missing: Vec<Uuid> },
    InFlight { ticket_id: Uuid },
    Failed {
        failures: Vec<UpdateFailure>,
        succeeded: Vec<Uuid>,
    },
}

/// Tickets that currently have a move in flight.
#[derive(Debug, Clone, Default)]
pub struct MoveGuard {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl MoveGuard {
    /// Claim `ticket_id`. Returns `None` when it is already claimed; the
    /// claim is released when the returned token drops.
    pub fn try_acquire(&self, ticket_id: Uuid) -> Option<MoveToken> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(ticket_id) {
            return None;
        }
        Some(MoveToken {
            guard: self.clone(),
            ticket_id,
        })
    }

    pub fn is_active(&self, ticket_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&ticket_id)
    }
}

pub struct MoveToken {
    guard: MoveGuard,
    ticket_id: Uuid,
}

impl Drop for MoveToken {
    fn drop(&mut self) {
        self.guard
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.ticket_id);
    }
}

pub struct PlacementEngine<S> {
    store: S,
    in_flight: MoveGuard,
}

impl<S: TicketStore> PlacementEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            in_flight: MoveGuard::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn in_flight(&self) -> &MoveGuard {
        &self.in_flight
    }

    /// Plan `request` against `snapshot`, persist it, and fold the returned
    /// records back into `snapshot` when every update succeeded.
    pub async fn execute(&self, snapshot: &mut BoardSnapshot, request: &MoveRequest) -> MoveOutcome {
        let ticket_id = request.ticket_id();
        let Some(_token) = self.in_flight.try_acquire(ticket_id) else {
            tracing::warn!(%ticket_id, "move rejected, ticket already has a move in flight");
            return MoveOutcome::InFlight { ticket_id };
        };

        let updates = match plan_move(snapshot, request) {
            Ok(MovePlan::Updates(updates)) => updates,
            Ok(MovePlan::NoOp) => {
                tracing::debug!(%ticket_id, "move is a no-op");
                return MoveOutcome::Unchanged;
            }
            Err(missing) => {
                tracing::warn!(%ticket_id, ?missing, "move references unknown ids");
                return MoveOutcome::NotFound { missing };
            }
        };

        let calls = updates.len();
        let results = join_all(updates.into_iter().map(|update| async move {
            let result = self.store.update_ticket(update.ticket_id, update.patch).await;
            (update.ticket_id, result)
        }))
        .await;

        let mut tickets = Vec::with_capacity(calls);
        let mut failures = Vec::new();
        for (id, result) in results {
            match result {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => failures.push(UpdateFailure {
                    ticket_id: id,
                    error: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            tracing::error!(
                %ticket_id,
                failed = failures.len(),
                calls,
                "move failed, board snapshot left untouched"
            );
            return MoveOutcome::Failed {
                failures,
                succeeded: tickets.iter().map(|t| t.id).collect(),
            };
        }

        snapshot.apply(&tickets);
        tracing::info!(%ticket_id, calls, "move applied");
        MoveOutcome::Applied { tickets }
    }
}
