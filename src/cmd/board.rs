//! Board client commands: `helpdesk board show` and `helpdesk board move`.

use anyhow::{Context, Result};
use uuid::Uuid;

use helpdesk::crm::client::ApiClient;
use helpdesk::crm::placement::{BoardSnapshot, MoveOutcome, PlacementEngine, resolve_drop};
use helpdesk::crm::store::BoardReader;

pub async fn cmd_board_show(server_url: &str) -> Result<()> {
    let client = ApiClient::new(server_url);
    let board = client
        .load_board()
        .await
        .with_context(|| format!("Failed to load board from {}", client.base_url()))?;
    print!("{}", render_board(&board));
    Ok(())
}

/// Drop `ticket` over `over` (a column or another ticket) and persist the
/// result through the API. A failed move reloads and prints the board.
pub async fn cmd_board_move(server_url: &str, ticket: &str, over: &str) -> Result<()> {
    let ticket_id = Uuid::parse_str(ticket).with_context(|| format!("Invalid ticket id '{}'", ticket))?;
    let over_id = Uuid::parse_str(over).with_context(|| format!("Invalid drop target id '{}'", over))?;

    let client = ApiClient::new(server_url);
    let mut board = client
        .load_board()
        .await
        .with_context(|| format!("Failed to load board from {}", client.base_url()))?;

    let Some(request) = resolve_drop(&board, ticket_id, over_id) else {
        anyhow::bail!(
            "Nothing to move: {} or {} is not on the board",
            ticket_id,
            over_id
        );
    };

    let engine = PlacementEngine::new(client.clone());
    let outcome = engine.execute(&mut board, &request).await;
    match outcome {
        MoveOutcome::Applied { tickets } => {
            println!("Moved {} ({} ticket(s) updated)", ticket_id, tickets.len());
            print!("{}", render_board(&board));
            Ok(())
        }
        MoveOutcome::Unchanged => {
            println!("Ticket {} is already there", ticket_id);
            Ok(())
        }
        MoveOutcome::NotFound { missing } => {
            anyhow::bail!("Unknown ids: {:?}", missing)
        }
        MoveOutcome::InFlight { ticket_id } => {
            anyhow::bail!("Ticket {} already has a move in flight", ticket_id)
        }
        MoveOutcome::Failed {
            failures,
            succeeded,
        } => {
            for f in &failures {
                eprintln!("  update of {} failed: {}", f.ticket_id, f.error);
            }
            // Partial writes may have landed; show the server's view.
            match client.load_board().await {
                Ok(fresh) => {
                    println!("Current board:");
                    print!("{}", render_board(&fresh));
                }
                Err(e) => eprintln!("Failed to reload board: {}", e),
            }
            anyhow::bail!(
                "Move failed: {} update(s) failed, {} succeeded",
                failures.len(),
                succeeded.len()
            )
        }
    }
}

/// Plain-text board: one block per column in position order.
pub fn render_board(board: &BoardSnapshot) -> String {
    let mut columns: Vec<_> = board.columns.iter().collect();
    columns.sort_by_key(|c| c.position);

    let mut out = String::new();
    for column in columns {
        let tickets = board.column_tickets(column.id);
        out.push_str(&format!(
            "== {} ({}) [{}]\n",
            column.name,
            tickets.len(),
            column.id
        ));
        for t in tickets {
            out.push_str(&format!(
                "  {:>3}  {}  {}  ({}, {})\n",
                t.order_in_column,
                t.id,
                t.title,
                t.status,
                t.priority.as_str()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk::crm::models::{Category, KanbanColumn, Priority, Ticket, TicketStatus};

    fn column(name: &str, position: i64) -> KanbanColumn {
        KanbanColumn {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
            color: None,
            created_at: String::new(),
        }
    }

    fn ticket(title: &str, column: &KanbanColumn, order: i64) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            kanban_column_id: column.id,
            order_in_column: order,
            status: TicketStatus::Open,
            title: title.into(),
            description: None,
            priority: Priority::High,
            category: Category::General,
            assigned_to: None,
            due_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_render_board_orders_columns_and_tickets() {
        let later = column("Em Andamento", 1);
        let first = column("A Fazer", 0);
        let board = BoardSnapshot {
            tickets: vec![
                ticket("second", &first, 1),
                ticket("first", &first, 0),
            ],
            columns: vec![later, first],
        };

        let text = render_board(&board);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("== A Fazer (2)"));
        assert!(lines[1].contains("first"));
        assert!(lines[1].contains("(open, high)"));
        assert!(lines[2].contains("second"));
        assert!(lines[3].starts_with("== Em Andamento (0)"));
    }

    #[test]
    fn test_render_empty_board() {
        assert_eq!(render_board(&BoardSnapshot::default()), "");
    }
}
