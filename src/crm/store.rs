//! Persistence seams used by the placement engine.
//!
//! The engine only ever needs two things from the outside world: read the
//! board, and write a partial update to one ticket. Both are traits so the
//! same engine runs inside the server (against SQLite) and inside the CLI
//! board client (against the HTTP API, see [`super::client::ApiClient`]).

use async_trait::async_trait;
use uuid::Uuid;

use super::db::DbHandle;
use super::models::{KanbanColumn, Ticket, TicketPatch};
use super::placement::BoardSnapshot;
use super::validation::PlacementPatch;
use crate::errors::{CrmError, StoreError};

/// Persists a partial ticket update and returns the full updated record.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn update_ticket(&self, id: Uuid, patch: TicketPatch) -> Result<Ticket, StoreError>;
}

/// Read side of the board.
#[async_trait]
pub trait BoardReader: Send + Sync {
    async fn list_columns(&self) -> Result<Vec<KanbanColumn>, StoreError>;

    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    async fn load_board(&self) -> Result<BoardSnapshot, StoreError> {
        let columns = self.list_columns().await?;
        let tickets = self.list_tickets().await?;
        Ok(BoardSnapshot { columns, tickets })
    }
}

fn store_error(err: anyhow::Error, id: Uuid) -> StoreError {
    match err.downcast_ref::<CrmError>() {
        Some(CrmError::TicketNotFound { .. }) => StoreError::NotFound { id },
        Some(e @ (CrmError::ColumnNotFound { .. } | CrmError::Validation(_))) => {
            StoreError::Rejected(e.to_string())
        }
        _ => StoreError::Unavailable(format!("{:#}", err)),
    }
}

/// Ticket store backed by the server's SQLite database.
#[derive(Clone)]
pub struct DbTicketStore {
    db: DbHandle,
}

impl DbTicketStore {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TicketStore for DbTicketStore {
    async fn update_ticket(&self, id: Uuid, patch: TicketPatch) -> Result<Ticket, StoreError> {
        let placement = PlacementPatch::try_from(&patch)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.db
            .call(move |db| db.apply_placement(id, &placement))
            .await
            .map_err(|e| store_error(e, id))
    }
}

#[async_trait]
impl BoardReader for DbTicketStore {
    async fn list_columns(&self) -> Result<Vec<KanbanColumn>, StoreError> {
        self.db
            .call(|db| db.list_columns())
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        self.db
            .call(|db| db.list_tickets())
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }

    async fn load_board(&self) -> Result<BoardSnapshot, StoreError> {
        self.db
            .call(|db| db.get_board())
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::CrmDb;
    use crate::crm::models::{Category, Priority, TicketStatus};
    use crate::crm::validation::{NewColumn, NewCustomer, NewTicket};

    fn seeded() -> (DbHandle, Uuid, Uuid, Uuid) {
        let db = CrmDb::new_in_memory().unwrap();
        let customer = db
            .create_customer(&NewCustomer {
                name: "Ana".into(),
                email: "ana@example.com".into(),
                phone: None,
                company: None,
                notes: None,
            })
            .unwrap();
        let todo = db
            .create_column(&NewColumn {
                name: "A Fazer".into(),
                position: 0,
                color: None,
            })
            .unwrap();
        let waiting = db
            .create_column(&NewColumn {
                name: "Aguardando Cliente".into(),
                position: 1,
                color: None,
            })
            .unwrap();
        let ticket = db
            .create_ticket(&NewTicket {
                title: "Refund".into(),
                description: None,
                customer_id: customer.id,
                kanban_column_id: todo.id,
                priority: Priority::Medium,
                category: Category::Billing,
                assigned_to: None,
                due_date: None,
            })
            .unwrap();
        (DbHandle::new(db), ticket.id, todo.id, waiting.id)
    }

    #[tokio::test]
    async fn test_db_store_rejects_unclassifiable_patches() {
        let (db, ticket, _, _) = seeded();
        let store = DbTicketStore::new(db);

        let status_only = TicketPatch {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        for patch in [TicketPatch::default(), status_only, TicketPatch::order(-1)] {
            let err = store.update_ticket(ticket, patch).await.unwrap_err();
            assert!(matches!(err, StoreError::Rejected(_)), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_db_store_moves_ticket() {
        let (db, ticket, _, waiting) = seeded();
        let store = DbTicketStore::new(db);
        let updated = store
            .update_ticket(
                ticket,
                TicketPatch::placement(waiting, 0, TicketStatus::WaitingCustomer),
            )
            .await
            .unwrap();
        assert_eq!(updated.kanban_column_id, waiting);
        assert_eq!(updated.status, TicketStatus::WaitingCustomer);
    }

    #[tokio::test]
    async fn test_db_store_maps_errors() {
        let (db, ticket, todo, _) = seeded();
        let store = DbTicketStore::new(db);

        let missing = Uuid::new_v4();
        let err = store
            .update_ticket(missing, TicketPatch::order(0))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound { id: missing });

        let err = store
            .update_ticket(ticket, TicketPatch::placement(todo, 0, TicketStatus::Closed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_db_store_loads_board() {
        let (db, ticket, todo, _) = seeded();
        let store = DbTicketStore::new(db);
        let board = store.load_board().await.unwrap();
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.column_tickets(todo)[0].id, ticket);
        assert_eq!(store.list_tickets().await.unwrap().len(), 1);
    }
}
