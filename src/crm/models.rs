use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KanbanColumn {
    pub id: Uuid,
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
    pub created_at: String,
}

/// Ticket lifecycle state. Always derived from the name of the ticket's
/// column, see [`super::status::derive_status`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    WaitingCustomer,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::WaitingCustomer => "waiting_customer",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "waiting_customer" => Ok(Self::WaitingCustomer),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technical,
    Financial,
    Operational,
    Account,
    Billing,
    #[default]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Financial => "financial",
            Self::Operational => "operational",
            Self::Account => "account",
            Self::Billing => "billing",
            Self::General => "general",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "technical" => Ok(Self::Technical),
            "financial" => Ok(Self::Financial),
            "operational" => Ok(Self::Operational),
            "account" => Ok(Self::Account),
            "billing" => Ok(Self::Billing),
            "general" => Ok(Self::General),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub kanban_column_id: Uuid,
    pub order_in_column: i64,
    pub status: TicketStatus,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Category,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Support,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Support => "support",
            Self::System => "system",
        }
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "support" => Ok(Self::Support),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid sender type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_type: SenderType,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketEventType {
    Created,
    ColumnChanged,
    StatusChanged,
    Updated,
}

impl TicketEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ColumnChanged => "column_changed",
            Self::StatusChanged => "status_changed",
            Self::Updated => "updated",
        }
    }
}

impl FromStr for TicketEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "column_changed" => Ok(Self::ColumnChanged),
            "status_changed" => Ok(Self::StatusChanged),
            "updated" => Ok(Self::Updated),
            _ => Err(format!("Invalid ticket event type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketEvent {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub event_type: TicketEventType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: String,
}

/// Partial placement update for a single ticket. Only the fields that are
/// `Some` are written; this is the payload the placement engine hands to a
/// [`super::store::TicketStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kanban_column_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_in_column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
}

impl TicketPatch {
    pub fn order(order_in_column: i64) -> Self {
        Self {
            order_in_column: Some(order_in_column),
            ..Self::default()
        }
    }

    pub fn placement(column_id: Uuid, order_in_column: i64, status: TicketStatus) -> Self {
        Self {
            kanban_column_id: Some(column_id),
            order_in_column: Some(order_in_column),
            status: Some(status),
        }
    }
}

// API view types

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSummary {
    pub id: Uuid,
    pub name: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketWithRelations {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub customer: Option<CustomerSummary>,
    pub kanban_column: Option<ColumnSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub customer: Option<CustomerSummary>,
    pub kanban_column: Option<ColumnSummary>,
    pub events: Vec<TicketEvent>,
    pub messages: Vec<TicketMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_status_roundtrip() {
        for s in &["open", "in_progress", "waiting_customer", "resolved", "closed"] {
            let parsed: TicketStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("em_andamento".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_priority_and_category_parse() {
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("critical".parse::<Priority>().is_err());
        assert_eq!("billing".parse::<Category>().unwrap(), Category::Billing);
        assert!("misc".parse::<Category>().is_err());
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Category::default(), Category::General);
    }

    #[test]
    fn test_serde_produces_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&TicketStatus::WaitingCustomer).unwrap(),
            "\"waiting_customer\""
        );
        assert_eq!(
            serde_json::to_string(&TicketEventType::ColumnChanged).unwrap(),
            "\"column_changed\""
        );
        assert_eq!(
            serde_json::from_str::<SenderType>("\"support\"").unwrap(),
            SenderType::Support
        );
    }

    #[test]
    fn test_ticket_patch_skips_absent_fields() {
        let json = serde_json::to_value(TicketPatch::order(3)).unwrap();
        assert_eq!(json, serde_json::json!({"order_in_column": 3}));

        let column = Uuid::new_v4();
        let json =
            serde_json::to_value(TicketPatch::placement(column, 0, TicketStatus::Closed)).unwrap();
        assert_eq!(json["kanban_column_id"], column.to_string());
        assert_eq!(json["status"], "closed");
    }

    #[test]
    fn test_ticket_with_relations_flattens_ticket() {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            kanban_column_id: Uuid::new_v4(),
            order_in_column: 0,
            status: TicketStatus::Open,
            title: "Printer on fire".to_string(),
            description: None,
            priority: Priority::High,
            category: Category::Technical,
            assigned_to: None,
            due_date: None,
            created_at: "2024-01-01".to_string(),
            updated_at: "2024-01-01".to_string(),
        };
        let view = TicketWithRelations {
            ticket,
            customer: None,
            kanban_column: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["title"], "Printer on fire");
        assert_eq!(json["priority"], "high");
        assert!(json["customer"].is_null());
    }
}
