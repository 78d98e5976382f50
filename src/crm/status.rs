//! Status derivation from kanban column names.
//!
//! Columns carry free-text display names ("A Fazer", "Em Andamento",
//! "Done", ...). A ticket's status is inferred from the name of the column
//! it sits in by case-insensitive substring matching against ordered
//! keyword groups. The first group with a hit wins; names matching nothing
//! fall back to [`TicketStatus::Open`].

use super::models::TicketStatus;

/// Keyword groups in match order.
const STATUS_KEYWORDS: &[(&[&str], TicketStatus)] = &[
    (&["fazer", "todo", "aberto", "aberta"], TicketStatus::Open),
    (&["andamento", "doing", "progress"], TicketStatus::InProgress),
    (
        &["cliente", "waiting", "aguardando"],
        TicketStatus::WaitingCustomer,
    ),
    (
        &["concluído", "concluída", "done", "closed", "fechado", "fechada"],
        TicketStatus::Closed,
    ),
    (
        &["resolvido", "resolvida", "resolved"],
        TicketStatus::Resolved,
    ),
];

/// Map a column display name to the status its tickets carry.
pub fn derive_status(column_name: &str) -> TicketStatus {
    let name = column_name.to_lowercase();
    STATUS_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| name.contains(k)))
        .map(|(_, status)| *status)
        .unwrap_or(TicketStatus::Open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_keyword_maps_to_its_group() {
        let table: &[(&str, TicketStatus)] = &[
            ("fazer", TicketStatus::Open),
            ("todo", TicketStatus::Open),
            ("aberto", TicketStatus::Open),
            ("aberta", TicketStatus::Open),
            ("andamento", TicketStatus::InProgress),
            ("doing", TicketStatus::InProgress),
            ("progress", TicketStatus::InProgress),
            ("cliente", TicketStatus::WaitingCustomer),
            ("waiting", TicketStatus::WaitingCustomer),
            ("aguardando", TicketStatus::WaitingCustomer),
            ("concluído", TicketStatus::Closed),
            ("concluída", TicketStatus::Closed),
            ("done", TicketStatus::Closed),
            ("closed", TicketStatus::Closed),
            ("fechado", TicketStatus::Closed),
            ("fechada", TicketStatus::Closed),
            ("resolvido", TicketStatus::Resolved),
            ("resolvida", TicketStatus::Resolved),
            ("resolved", TicketStatus::Resolved),
        ];
        for (name, expected) in table {
            assert_eq!(derive_status(name), *expected, "column name {:?}", name);
        }
    }

    #[test]
    fn test_real_column_names() {
        assert_eq!(derive_status("A Fazer"), TicketStatus::Open);
        assert_eq!(derive_status("Em Andamento"), TicketStatus::InProgress);
        assert_eq!(derive_status("In Progress"), TicketStatus::InProgress);
        assert_eq!(
            derive_status("Aguardando Cliente"),
            TicketStatus::WaitingCustomer
        );
        assert_eq!(derive_status("Resolvido"), TicketStatus::Resolved);
        assert_eq!(derive_status("CONCLUÍDO"), TicketStatus::Closed);
        assert_eq!(derive_status("Done"), TicketStatus::Closed);
    }

    #[test]
    fn test_first_group_wins() {
        // "todo" (open) is checked before "done" (closed)
        assert_eq!(derive_status("todo / done"), TicketStatus::Open);
        // "cliente" (waiting) is checked before "resolvido"
        assert_eq!(
            derive_status("Resolvido pelo cliente"),
            TicketStatus::WaitingCustomer
        );
    }

    #[test]
    fn test_unmatched_name_falls_back_to_open() {
        assert_eq!(derive_status("Backlog Especial"), TicketStatus::Open);
        assert_eq!(derive_status(""), TicketStatus::Open);
    }

    #[test]
    fn test_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(derive_status("Em Andamento"), TicketStatus::InProgress);
        }
    }
}
