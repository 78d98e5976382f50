use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::models::*;
use super::placement::BoardSnapshot;
use super::status::derive_status;
use super::validation::{
    ColumnChanges, CustomerChanges, NewColumn, NewCustomer, NewMessage, NewTicket, PlacementPatch,
    TicketChanges,
};
use crate::errors::CrmError;

/// Async-safe handle to the CRM database.
///
/// Wraps `CrmDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<CrmDb>>,
}

impl DbHandle {
    pub fn new(db: CrmDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CrmDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

const CUSTOMER_COLUMNS: &str =
    "id, name, email, phone, company, notes, created_at, updated_at";
const COLUMN_COLUMNS: &str = "id, name, position, color, created_at";
const TICKET_COLUMNS: &str = "id, customer_id, kanban_column_id, order_in_column, status, title, description, priority, category, assigned_to, due_date, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, ticket_id, sender_type, message, created_at";
const EVENT_COLUMNS: &str = "id, ticket_id, event_type, old_value, new_value, created_at";

/// Column names seeded by `helpdesk init --seed`, left to right.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "A Fazer",
    "Em Andamento",
    "Aguardando Cliente",
    "Resolvido",
    "Concluído",
];

pub struct CrmDb {
    conn: Connection,
}

impl CrmDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS customers (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    phone TEXT,
                    company TEXT,
                    notes TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS kanban_columns (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0,
                    color TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id TEXT PRIMARY KEY,
                    customer_id TEXT NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
                    kanban_column_id TEXT NOT NULL REFERENCES kanban_columns(id),
                    order_in_column INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'open',
                    title TEXT NOT NULL,
                    description TEXT,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    category TEXT NOT NULL DEFAULT 'general',
                    assigned_to TEXT,
                    due_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS ticket_messages (
                    id TEXT PRIMARY KEY,
                    ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    sender_type TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS ticket_events (
                    id TEXT PRIMARY KEY,
                    ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    event_type TEXT NOT NULL,
                    old_value TEXT,
                    new_value TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_tickets_column ON tickets(kanban_column_id, order_in_column);
                CREATE INDEX IF NOT EXISTS idx_tickets_customer ON tickets(customer_id);
                CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_ticket_events_ticket ON ticket_events(ticket_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Insert the default board columns when the board has none yet.
    /// Returns the number of columns created.
    pub fn seed_default_columns(&self) -> Result<usize> {
        if !self.list_columns()?.is_empty() {
            return Ok(0);
        }
        for (position, name) in DEFAULT_COLUMNS.iter().enumerate() {
            self.create_column(&NewColumn {
                name: name.to_string(),
                position: position as i64,
                color: None,
            })?;
        }
        Ok(DEFAULT_COLUMNS.len())
    }

    // ── Customer CRUD ─────────────────────────────────────────────────

    pub fn create_customer(&self, new: &NewCustomer) -> Result<Customer> {
        let id = Uuid::new_v4();
        self.conn
            .execute(
                "INSERT INTO customers (id, name, email, phone, company, notes) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id.to_string(), new.name, new.email, new.phone, new.company, new.notes],
            )
            .context("Failed to insert customer")?;
        self.get_customer(id)?
            .context("Customer not found after insert")
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers ORDER BY created_at DESC, rowid DESC",
            CUSTOMER_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_customers")?;
        let rows = stmt
            .query_map([], CustomerRow::from_row)
            .context("Failed to query customers")?;
        let mut customers = Vec::new();
        for row in rows {
            let r = row.context("Failed to read customer row")?;
            customers.push(r.into_customer()?);
        }
        Ok(customers)
    }

    pub fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let sql = format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], CustomerRow::from_row)
            .optional()
            .context("Failed to query customer")?;
        row.map(CustomerRow::into_customer).transpose()
    }

    pub fn update_customer(&self, id: Uuid, changes: &CustomerChanges) -> Result<Customer> {
        let count = self
            .conn
            .execute(
                "UPDATE customers SET
                    name = COALESCE(?1, name),
                    email = COALESCE(?2, email),
                    phone = COALESCE(?3, phone),
                    company = COALESCE(?4, company),
                    notes = COALESCE(?5, notes),
                    updated_at = datetime('now')
                 WHERE id = ?6",
                params![
                    changes.name,
                    changes.email,
                    changes.phone,
                    changes.company,
                    changes.notes,
                    id.to_string()
                ],
            )
            .context("Failed to update customer")?;
        if count == 0 {
            return Err(CrmError::CustomerNotFound { id }.into());
        }
        self.get_customer(id)?
            .context("Customer not found after update")
    }

    pub fn delete_customer(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM customers WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete customer")?;
        Ok(count > 0)
    }

    // ── Kanban columns ────────────────────────────────────────────────

    pub fn create_column(&self, new: &NewColumn) -> Result<KanbanColumn> {
        let id = Uuid::new_v4();
        self.conn
            .execute(
                "INSERT INTO kanban_columns (id, name, position, color) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), new.name, new.position, new.color],
            )
            .context("Failed to insert kanban column")?;
        self.get_column(id)?
            .context("Kanban column not found after insert")
    }

    pub fn list_columns(&self) -> Result<Vec<KanbanColumn>> {
        let sql = format!(
            "SELECT {} FROM kanban_columns ORDER BY position, rowid",
            COLUMN_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map([], ColumnRow::from_row)
            .context("Failed to query kanban columns")?;
        let mut columns = Vec::new();
        for row in rows {
            let r = row.context("Failed to read kanban column row")?;
            columns.push(r.into_column()?);
        }
        Ok(columns)
    }

    pub fn get_column(&self, id: Uuid) -> Result<Option<KanbanColumn>> {
        let sql = format!("SELECT {} FROM kanban_columns WHERE id = ?1", COLUMN_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], ColumnRow::from_row)
            .optional()
            .context("Failed to query kanban column")?;
        row.map(ColumnRow::into_column).transpose()
    }

    /// Update a column. A rename re-derives the status of every ticket in
    /// the column so status keeps following the column name.
    pub fn update_column(&self, id: Uuid, changes: &ColumnChanges) -> Result<KanbanColumn> {
        let current = self
            .get_column(id)?
            .ok_or(CrmError::ColumnNotFound { id })?;

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE kanban_columns SET
                name = COALESCE(?1, name),
                position = COALESCE(?2, position),
                color = COALESCE(?3, color)
             WHERE id = ?4",
            params![changes.name, changes.position, changes.color, id.to_string()],
        )
        .context("Failed to update kanban column")?;

        if let Some(name) = changes.name.as_deref().filter(|n| *n != current.name) {
            let status = derive_status(name);
            for ticket in self.list_tickets_by_column(id)? {
                if ticket.status == status {
                    continue;
                }
                tx.execute(
                    "UPDATE tickets SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![status.as_str(), ticket.id.to_string()],
                )
                .context("Failed to re-derive ticket status")?;
                insert_event(
                    &tx,
                    ticket.id,
                    TicketEventType::StatusChanged,
                    Some(ticket.status.as_str()),
                    Some(status.as_str()),
                )?;
            }
        }

        tx.commit().context("Failed to commit column update")?;
        self.get_column(id)?
            .context("Kanban column not found after update")
    }

    /// Delete a column. Columns that still hold tickets are refused.
    pub fn delete_column(&self, id: Uuid) -> Result<bool> {
        let tickets: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tickets WHERE kanban_column_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .context("Failed to count column tickets")?;
        if tickets > 0 {
            return Err(CrmError::ColumnInUse {
                id,
                tickets: tickets as usize,
            }
            .into());
        }
        let count = self
            .conn
            .execute("DELETE FROM kanban_columns WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete kanban column")?;
        Ok(count > 0)
    }

    // ── Ticket CRUD ───────────────────────────────────────────────────

    /// Create a ticket at the end of its column with the status the column
    /// name implies.
    pub fn create_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        if self.get_customer(new.customer_id)?.is_none() {
            return Err(CrmError::CustomerNotFound {
                id: new.customer_id,
            }
            .into());
        }
        let column = self
            .get_column(new.kanban_column_id)?
            .ok_or(CrmError::ColumnNotFound {
                id: new.kanban_column_id,
            })?;
        let status = derive_status(&column.name);

        let max_order: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(order_in_column), -1) FROM tickets WHERE kanban_column_id = ?1",
                params![column.id.to_string()],
                |row| row.get(0),
            )
            .context("Failed to get max order")?;

        let id = Uuid::new_v4();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO tickets (id, customer_id, kanban_column_id, order_in_column, status, title, description, priority, category, assigned_to, due_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.to_string(),
                new.customer_id.to_string(),
                column.id.to_string(),
                max_order + 1,
                status.as_str(),
                new.title,
                new.description,
                new.priority.as_str(),
                new.category.as_str(),
                new.assigned_to,
                new.due_date
            ],
        )
        .context("Failed to insert ticket")?;
        insert_event(
            &tx,
            id,
            TicketEventType::Created,
            None,
            Some(status.as_str()),
        )?;
        tx.commit().context("Failed to commit ticket insert")?;

        self.get_ticket(id)?.context("Ticket not found after insert")
    }

    fn query_tickets(&self, where_clause: &str, order: &str, param: Option<String>) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY {}",
            TICKET_COLUMNS, where_clause, order
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare ticket query")?;
        let rows = match &param {
            Some(p) => stmt.query_map(params![p], TicketRow::from_row),
            None => stmt.query_map([], TicketRow::from_row),
        }
        .context("Failed to query tickets")?;
        let mut tickets = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket row")?;
            tickets.push(r.into_ticket()?);
        }
        Ok(tickets)
    }

    pub fn list_tickets(&self) -> Result<Vec<Ticket>> {
        self.query_tickets("", "created_at DESC, rowid DESC", None)
    }

    pub fn list_tickets_by_customer(&self, customer_id: Uuid) -> Result<Vec<Ticket>> {
        self.query_tickets(
            "WHERE customer_id = ?1",
            "created_at DESC, rowid DESC",
            Some(customer_id.to_string()),
        )
    }

    pub fn list_tickets_by_column(&self, column_id: Uuid) -> Result<Vec<Ticket>> {
        self.query_tickets(
            "WHERE kanban_column_id = ?1",
            "order_in_column, rowid",
            Some(column_id.to_string()),
        )
    }

    pub fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], TicketRow::from_row)
            .optional()
            .context("Failed to query ticket")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    fn relations(&self, ticket: &Ticket) -> Result<(Option<CustomerSummary>, Option<ColumnSummary>)> {
        let customer = self.get_customer(ticket.customer_id)?.map(|c| CustomerSummary {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
        });
        let column = self
            .get_column(ticket.kanban_column_id)?
            .map(|c| ColumnSummary {
                id: c.id,
                name: c.name,
                position: c.position,
            });
        Ok((customer, column))
    }

    pub fn list_tickets_with_relations(&self) -> Result<Vec<TicketWithRelations>> {
        let mut out = Vec::new();
        for ticket in self.list_tickets()? {
            let (customer, kanban_column) = self.relations(&ticket)?;
            out.push(TicketWithRelations {
                ticket,
                customer,
                kanban_column,
            });
        }
        Ok(out)
    }

    fn ticket_detail(&self, ticket: Ticket) -> Result<TicketDetail> {
        let (customer, kanban_column) = self.relations(&ticket)?;
        let events = self.list_events(ticket.id)?;
        let messages = self.list_messages(ticket.id)?;
        Ok(TicketDetail {
            ticket,
            customer,
            kanban_column,
            events,
            messages,
        })
    }

    pub fn get_ticket_detail(&self, id: Uuid) -> Result<Option<TicketDetail>> {
        match self.get_ticket(id)? {
            Some(ticket) => Ok(Some(self.ticket_detail(ticket)?)),
            None => Ok(None),
        }
    }

    /// Every ticket that is not closed, with customer, column, events and
    /// messages, newest first.
    pub fn list_open_ticket_details(&self) -> Result<Vec<TicketDetail>> {
        let tickets = self.query_tickets(
            "WHERE status != 'closed'",
            "created_at DESC, rowid DESC",
            None,
        )?;
        tickets
            .into_iter()
            .map(|ticket| self.ticket_detail(ticket))
            .collect()
    }

    pub fn update_ticket(&self, id: Uuid, changes: &TicketChanges) -> Result<Ticket> {
        if self.get_ticket(id)?.is_none() {
            return Err(CrmError::TicketNotFound { id }.into());
        }
        if let Some(customer_id) = changes.customer_id {
            if self.get_customer(customer_id)?.is_none() {
                return Err(CrmError::CustomerNotFound { id: customer_id }.into());
            }
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE tickets SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                customer_id = COALESCE(?3, customer_id),
                priority = COALESCE(?4, priority),
                category = COALESCE(?5, category),
                assigned_to = COALESCE(?6, assigned_to),
                due_date = COALESCE(?7, due_date),
                updated_at = datetime('now')
             WHERE id = ?8",
            params![
                changes.title,
                changes.description,
                changes.customer_id.map(|c| c.to_string()),
                changes.priority.map(|p| p.as_str()),
                changes.category.map(|c| c.as_str()),
                changes.assigned_to,
                changes.due_date,
                id.to_string()
            ],
        )
        .context("Failed to update ticket")?;
        insert_event(&tx, id, TicketEventType::Updated, None, None)?;
        tx.commit().context("Failed to commit ticket update")?;

        self.get_ticket(id)?.context("Ticket not found after update")
    }

    /// Write a placement patch. Column placements always take the status the
    /// target column's name implies and record `column_changed` and
    /// `status_changed` events in the same transaction.
    pub fn apply_placement(&self, id: Uuid, patch: &PlacementPatch) -> Result<Ticket> {
        let current = self
            .get_ticket(id)?
            .ok_or(CrmError::TicketNotFound { id })?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        match *patch {
            PlacementPatch::Column {
                kanban_column_id,
                order_in_column,
                expected_status,
            } => {
                let column = self
                    .get_column(kanban_column_id)?
                    .ok_or(CrmError::ColumnNotFound {
                        id: kanban_column_id,
                    })?;
                let status = derive_status(&column.name);
                if let Some(expected) = expected_status.filter(|s| *s != status) {
                    return Err(CrmError::invalid(
                        "status",
                        format!(
                            "Column '{}' implies status {}, not {}",
                            column.name, status, expected
                        ),
                    )
                    .into());
                }

                tx.execute(
                    "UPDATE tickets SET kanban_column_id = ?1, order_in_column = ?2, status = ?3, updated_at = datetime('now') WHERE id = ?4",
                    params![column.id.to_string(), order_in_column, status.as_str(), id.to_string()],
                )
                .context("Failed to move ticket")?;

                if current.kanban_column_id != column.id {
                    let from = self.get_column(current.kanban_column_id)?.map(|c| c.name);
                    insert_event(
                        &tx,
                        id,
                        TicketEventType::ColumnChanged,
                        from.as_deref(),
                        Some(&column.name),
                    )?;
                }
                if current.status != status {
                    insert_event(
                        &tx,
                        id,
                        TicketEventType::StatusChanged,
                        Some(current.status.as_str()),
                        Some(status.as_str()),
                    )?;
                }
            }
            PlacementPatch::Order { order_in_column } => {
                tx.execute(
                    "UPDATE tickets SET order_in_column = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![order_in_column, id.to_string()],
                )
                .context("Failed to reorder ticket")?;
            }
        }
        tx.commit().context("Failed to commit ticket placement")?;

        self.get_ticket(id)?
            .context("Ticket not found after placement")
    }

    pub fn delete_ticket(&self, id: Uuid) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tickets WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete ticket")?;
        Ok(count > 0)
    }

    // ── Messages & events ─────────────────────────────────────────────

    pub fn add_message(&self, ticket_id: Uuid, new: &NewMessage) -> Result<TicketMessage> {
        if self.get_ticket(ticket_id)?.is_none() {
            return Err(CrmError::TicketNotFound { id: ticket_id }.into());
        }
        let id = Uuid::new_v4();
        self.conn
            .execute(
                "INSERT INTO ticket_messages (id, ticket_id, sender_type, message) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), ticket_id.to_string(), new.sender_type.as_str(), new.message],
            )
            .context("Failed to insert ticket message")?;
        let sql = format!("SELECT {} FROM ticket_messages WHERE id = ?1", MESSAGE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], MessageRow::from_row)
            .context("Ticket message not found after insert")?;
        row.into_message()
    }

    pub fn list_messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>> {
        let sql = format!(
            "SELECT {} FROM ticket_messages WHERE ticket_id = ?1 ORDER BY created_at, rowid",
            MESSAGE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![ticket_id.to_string()], MessageRow::from_row)
            .context("Failed to query ticket messages")?;
        let mut messages = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket message row")?;
            messages.push(r.into_message()?);
        }
        Ok(messages)
    }

    pub fn list_events(&self, ticket_id: Uuid) -> Result<Vec<TicketEvent>> {
        let sql = format!(
            "SELECT {} FROM ticket_events WHERE ticket_id = ?1 ORDER BY created_at, rowid",
            EVENT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_events")?;
        let rows = stmt
            .query_map(params![ticket_id.to_string()], EventRow::from_row)
            .context("Failed to query ticket events")?;
        let mut events = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket event row")?;
            events.push(r.into_event()?);
        }
        Ok(events)
    }

    // ── Board view ────────────────────────────────────────────────────

    /// Columns by position plus every ticket, ordered by column then order.
    pub fn get_board(&self) -> Result<BoardSnapshot> {
        let columns = self.list_columns()?;
        let tickets =
            self.query_tickets("", "kanban_column_id, order_in_column, rowid", None)?;
        Ok(BoardSnapshot { columns, tickets })
    }
}

fn insert_event(
    conn: &Connection,
    ticket_id: Uuid,
    event_type: TicketEventType,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO ticket_events (id, ticket_id, event_type, old_value, new_value) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            ticket_id.to_string(),
            event_type.as_str(),
            old_value,
            new_value
        ],
    )
    .context("Failed to insert ticket event")?;
    Ok(())
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID in database: {}", value))
}

// ── Row types ─────────────────────────────────────────────────────────

struct CustomerRow {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    company: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CustomerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            company: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_customer(self) -> Result<Customer> {
        Ok(Customer {
            id: parse_uuid(&self.id)?,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct ColumnRow {
    id: String,
    name: String,
    position: i64,
    color: Option<String>,
    created_at: String,
}

impl ColumnRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            color: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_column(self) -> Result<KanbanColumn> {
        Ok(KanbanColumn {
            id: parse_uuid(&self.id)?,
            name: self.name,
            position: self.position,
            color: self.color,
            created_at: self.created_at,
        })
    }
}

struct TicketRow {
    id: String,
    customer_id: String,
    kanban_column_id: String,
    order_in_column: i64,
    status: String,
    title: String,
    description: Option<String>,
    priority: String,
    category: String,
    assigned_to: Option<String>,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TicketRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            kanban_column_id: row.get(2)?,
            order_in_column: row.get(3)?,
            status: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            priority: row.get(7)?,
            category: row.get(8)?,
            assigned_to: row.get(9)?,
            due_date: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: parse_uuid(&self.id)?,
            customer_id: parse_uuid(&self.customer_id)?,
            kanban_column_id: parse_uuid(&self.kanban_column_id)?,
            order_in_column: self.order_in_column,
            status: self.status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            title: self.title,
            description: self.description,
            priority: self.priority.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            category: self.category.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct MessageRow {
    id: String,
    ticket_id: String,
    sender_type: String,
    message: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            sender_type: row.get(2)?,
            message: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_message(self) -> Result<TicketMessage> {
        Ok(TicketMessage {
            id: parse_uuid(&self.id)?,
            ticket_id: parse_uuid(&self.ticket_id)?,
            sender_type: self
                .sender_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            message: self.message,
            created_at: self.created_at,
        })
    }
}

struct EventRow {
    id: String,
    ticket_id: String,
    event_type: String,
    old_value: Option<String>,
    new_value: Option<String>,
    created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            event_type: row.get(2)?,
            old_value: row.get(3)?,
            new_value: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_event(self) -> Result<TicketEvent> {
        Ok(TicketEvent {
            id: parse_uuid(&self.id)?,
            ticket_id: parse_uuid(&self.ticket_id)?,
            event_type: self
                .event_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            old_value: self.old_value,
            new_value: self.new_value,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(db: &CrmDb, name: &str) -> Result<Customer> {
        db.create_customer(&NewCustomer {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            company: None,
            notes: None,
        })
    }

    fn column(db: &CrmDb, name: &str, position: i64) -> Result<KanbanColumn> {
        db.create_column(&NewColumn {
            name: name.to_string(),
            position,
            color: None,
        })
    }

    fn ticket(db: &CrmDb, title: &str, customer: &Customer, column: &KanbanColumn) -> Result<Ticket> {
        db.create_ticket(&NewTicket {
            title: title.to_string(),
            description: None,
            customer_id: customer.id,
            kanban_column_id: column.id,
            priority: Priority::Medium,
            category: Category::General,
            assigned_to: None,
            due_date: None,
        })
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for table in ["customers", "kanban_columns", "ticket_events", "ticket_messages", "tickets"] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("helpdesk.db");
        CrmDb::new(&path)?.seed_default_columns()?;
        let reopened = CrmDb::new(&path)?;
        assert_eq!(reopened.list_columns()?.len(), DEFAULT_COLUMNS.len());
        Ok(())
    }

    #[test]
    fn test_seed_default_columns_only_once() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        assert_eq!(db.seed_default_columns()?, 5);
        assert_eq!(db.seed_default_columns()?, 0);
        let names: Vec<String> = db.list_columns()?.into_iter().map(|c| c.name).collect();
        assert_eq!(names, DEFAULT_COLUMNS);
        Ok(())
    }

    #[test]
    fn test_customer_crud() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        assert_eq!(c.email, "ana@example.com");

        let updated = db.update_customer(
            c.id,
            &CustomerChanges {
                company: Some("Acme".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.company.as_deref(), Some("Acme"));
        assert_eq!(updated.name, "Ana");

        assert!(db.delete_customer(c.id)?);
        assert!(db.get_customer(c.id)?.is_none());
        assert!(!db.delete_customer(c.id)?);
        Ok(())
    }

    #[test]
    fn test_update_missing_customer_is_typed_not_found() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let err = db
            .update_customer(Uuid::new_v4(), &CustomerChanges::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::CustomerNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_create_ticket_derives_status_and_appends() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let doing = column(&db, "Em Andamento", 1)?;

        let t1 = ticket(&db, "First", &c, &doing)?;
        let t2 = ticket(&db, "Second", &c, &doing)?;
        assert_eq!(t1.status, TicketStatus::InProgress);
        assert_eq!(t1.order_in_column, 0);
        assert_eq!(t2.order_in_column, 1);

        let events = db.list_events(t1.id)?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TicketEventType::Created);
        Ok(())
    }

    #[test]
    fn test_create_ticket_requires_existing_refs() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let todo = column(&db, "A Fazer", 0)?;
        let ghost_column = KanbanColumn {
            id: Uuid::new_v4(),
            ..todo.clone()
        };
        let err = ticket(&db, "Orphan", &c, &ghost_column).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::ColumnNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_apply_placement_moves_and_records_events() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let todo = column(&db, "A Fazer", 0)?;
        let done = column(&db, "Concluído", 1)?;
        let t = ticket(&db, "Move me", &c, &todo)?;

        let moved = db.apply_placement(
            t.id,
            &PlacementPatch::Column {
                kanban_column_id: done.id,
                order_in_column: 0,
                expected_status: None,
            },
        )?;
        assert_eq!(moved.kanban_column_id, done.id);
        assert_eq!(moved.status, TicketStatus::Closed);

        let events = db.list_events(t.id)?;
        let kinds: Vec<TicketEventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                TicketEventType::Created,
                TicketEventType::ColumnChanged,
                TicketEventType::StatusChanged
            ]
        );
        assert_eq!(events[1].old_value.as_deref(), Some("A Fazer"));
        assert_eq!(events[1].new_value.as_deref(), Some("Concluído"));
        assert_eq!(events[2].new_value.as_deref(), Some("closed"));
        Ok(())
    }

    #[test]
    fn test_apply_placement_rejects_mismatched_status() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let todo = column(&db, "A Fazer", 0)?;
        let t = ticket(&db, "Stay", &c, &todo)?;

        let err = db
            .apply_placement(
                t.id,
                &PlacementPatch::Column {
                    kanban_column_id: todo.id,
                    order_in_column: 0,
                    expected_status: Some(TicketStatus::Closed),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::Validation(_))
        ));
        assert_eq!(db.get_ticket(t.id)?.unwrap().status, TicketStatus::Open);
        Ok(())
    }

    #[test]
    fn test_apply_order_patch_keeps_column_and_status() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let doing = column(&db, "Doing", 0)?;
        let t = ticket(&db, "Reorder", &c, &doing)?;

        let updated = db.apply_placement(t.id, &PlacementPatch::Order { order_in_column: 4 })?;
        assert_eq!(updated.order_in_column, 4);
        assert_eq!(updated.kanban_column_id, doing.id);
        assert_eq!(updated.status, TicketStatus::InProgress);
        Ok(())
    }

    #[test]
    fn test_rename_column_rederives_ticket_status() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let col = column(&db, "Backlog", 0)?;
        let t = ticket(&db, "Renamed", &c, &col)?;
        assert_eq!(t.status, TicketStatus::Open);

        db.update_column(
            col.id,
            &ColumnChanges {
                name: Some("Resolvido".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(db.get_ticket(t.id)?.unwrap().status, TicketStatus::Resolved);
        Ok(())
    }

    #[test]
    fn test_delete_column_in_use_is_refused() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let col = column(&db, "A Fazer", 0)?;
        let empty = column(&db, "Empty", 1)?;
        ticket(&db, "Blocker", &c, &col)?;

        let err = db.delete_column(col.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::ColumnInUse { tickets: 1, .. })
        ));
        assert!(db.delete_column(empty.id)?);
        Ok(())
    }

    #[test]
    fn test_delete_customer_cascades_tickets() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let col = column(&db, "A Fazer", 0)?;
        let t = ticket(&db, "Gone", &c, &col)?;
        db.add_message(
            t.id,
            &NewMessage {
                sender_type: SenderType::Customer,
                message: "hello".into(),
            },
        )?;

        db.delete_customer(c.id)?;
        assert!(db.get_ticket(t.id)?.is_none());
        assert!(db.list_messages(t.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_open_ticket_details_exclude_closed() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let todo = column(&db, "A Fazer", 0)?;
        let done = column(&db, "Done", 1)?;
        let open = ticket(&db, "Open one", &c, &todo)?;
        ticket(&db, "Closed one", &c, &done)?;
        db.add_message(
            open.id,
            &NewMessage {
                sender_type: SenderType::Support,
                message: "On it".into(),
            },
        )?;

        let details = db.list_open_ticket_details()?;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].ticket.title, "Open one");
        assert_eq!(details[0].messages.len(), 1);
        assert_eq!(details[0].events.len(), 1);
        assert_eq!(
            details[0].customer.as_ref().map(|c| c.name.as_str()),
            Some("Ana")
        );
        assert_eq!(
            details[0].kanban_column.as_ref().map(|c| c.name.as_str()),
            Some("A Fazer")
        );
        Ok(())
    }

    #[test]
    fn test_messages_oldest_first() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let col = column(&db, "A Fazer", 0)?;
        let t = ticket(&db, "Chatty", &c, &col)?;
        for text in ["first", "second", "third"] {
            db.add_message(
                t.id,
                &NewMessage {
                    sender_type: SenderType::Customer,
                    message: text.into(),
                },
            )?;
        }
        let texts: Vec<String> = db.list_messages(t.id)?.into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        let err = db
            .add_message(
                Uuid::new_v4(),
                &NewMessage {
                    sender_type: SenderType::Customer,
                    message: "lost".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::TicketNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_get_board_groups_tickets() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let c = customer(&db, "Ana")?;
        let doing = column(&db, "Em Andamento", 1)?;
        let todo = column(&db, "A Fazer", 0)?;
        ticket(&db, "a", &c, &todo)?;
        ticket(&db, "b", &c, &todo)?;
        ticket(&db, "c", &c, &doing)?;

        let board = db.get_board()?;
        assert_eq!(board.columns[0].name, "A Fazer");
        assert_eq!(board.columns[1].name, "Em Andamento");
        assert_eq!(board.tickets.len(), 3);
        let todo_titles: Vec<&str> = board
            .column_tickets(todo.id)
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(todo_titles, vec!["a", "b"]);
        Ok(())
    }
}
