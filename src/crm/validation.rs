//! Request payloads and their validation.
//!
//! Every payload deserializes leniently (strings for enums and ids) and is
//! then checked by `validate()`, which collects all field problems into a
//! single [`CrmError::Validation`] instead of failing on the first one.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use super::models::{Category, Priority, SenderType, TicketPatch, TicketStatus};
use crate::errors::{CrmError, FieldError};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

// ── Validated values ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewColumn {
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnChanges {
    pub name: Option<String>,
    pub position: Option<i64>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Uuid,
    pub kanban_column_id: Uuid,
    pub priority: Priority,
    pub category: Category,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub customer_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_type: SenderType,
    pub message: String,
}

/// A placement patch classified by the fields it carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementPatch {
    /// Move into a column at an explicit order. The status is always
    /// re-derived from the column name; `expected_status` is only checked.
    Column {
        kanban_column_id: Uuid,
        order_in_column: i64,
        expected_status: Option<TicketStatus>,
    },
    /// Renumber within the current column.
    Order { order_in_column: i64 },
}

// ── Payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateColumnRequest {
    #[serde(default)]
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateColumnRequest {
    pub name: Option<String>,
    pub position: Option<i64>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub kanban_column_id: String,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    pub kanban_column_id: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchTicketRequest {
    pub kanban_column_id: Option<String>,
    pub order_in_column: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub sender_type: String,
    #[serde(default)]
    pub message: String,
}

// ── Field checks ──────────────────────────────────────────────────────

fn check_text(errors: &mut Vec<FieldError>, field: &str, label: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{} is required", label)));
    } else if value.chars().count() > max {
        errors.push(FieldError::new(field, format!("{} is too long", label)));
    }
}

fn check_email(errors: &mut Vec<FieldError>, value: &str) {
    if value.chars().count() > 255 {
        errors.push(FieldError::new("email", "Email is too long"));
    } else if !EMAIL_RE.is_match(value) {
        errors.push(FieldError::new("email", "Invalid email"));
    }
}

fn check_position(errors: &mut Vec<FieldError>, field: &str, label: &str, value: i64) {
    if value < 0 {
        errors.push(FieldError::new(field, format!("{} must be non-negative", label)));
    }
}

/// Due dates are either a calendar date or an RFC 3339 timestamp.
fn check_due_date(errors: &mut Vec<FieldError>, value: &str) {
    let value = value.trim();
    let valid = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || chrono::DateTime::parse_from_rfc3339(value).is_ok();
    if !valid {
        errors.push(FieldError::new(
            "due_date",
            "Due date must be YYYY-MM-DD or an RFC 3339 timestamp",
        ));
    }
}

fn parse_id(errors: &mut Vec<FieldError>, field: &str, label: &str, value: &str) -> Option<Uuid> {
    match Uuid::parse_str(value.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(FieldError::new(field, format!("Invalid {} id", label)));
            None
        }
    }
}

fn parse_enum<T: FromStr<Err = String>>(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: &str,
) -> Option<T> {
    match T::from_str(value) {
        Ok(v) => Some(v),
        Err(msg) => {
            errors.push(FieldError::new(field, msg));
            None
        }
    }
}

fn finish<T>(errors: Vec<FieldError>, value: impl FnOnce() -> T) -> Result<T, CrmError> {
    if errors.is_empty() {
        Ok(value())
    } else {
        Err(CrmError::Validation(errors))
    }
}

// ── Validation ────────────────────────────────────────────────────────

impl CreateCustomerRequest {
    pub fn validate(self) -> Result<NewCustomer, CrmError> {
        let mut errors = Vec::new();
        check_text(&mut errors, "name", "Name", &self.name, 255);
        check_email(&mut errors, &self.email);
        finish(errors, || NewCustomer {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone,
            company: self.company,
            notes: self.notes,
        })
    }
}

impl UpdateCustomerRequest {
    pub fn validate(self) -> Result<CustomerChanges, CrmError> {
        let mut errors = Vec::new();
        if let Some(name) = &self.name {
            check_text(&mut errors, "name", "Name", name, 255);
        }
        if let Some(email) = &self.email {
            check_email(&mut errors, email);
        }
        finish(errors, || CustomerChanges {
            name: self.name.map(|n| n.trim().to_string()),
            email: self.email.map(|e| e.trim().to_string()),
            phone: self.phone,
            company: self.company,
            notes: self.notes,
        })
    }
}

impl CreateColumnRequest {
    pub fn validate(self) -> Result<NewColumn, CrmError> {
        let mut errors = Vec::new();
        check_text(&mut errors, "name", "Name", &self.name, 100);
        check_position(&mut errors, "position", "Position", self.position);
        finish(errors, || NewColumn {
            name: self.name.trim().to_string(),
            position: self.position,
            color: self.color,
        })
    }
}

impl UpdateColumnRequest {
    pub fn validate(self) -> Result<ColumnChanges, CrmError> {
        let mut errors = Vec::new();
        if let Some(name) = &self.name {
            check_text(&mut errors, "name", "Name", name, 100);
        }
        if let Some(position) = self.position {
            check_position(&mut errors, "position", "Position", position);
        }
        finish(errors, || ColumnChanges {
            name: self.name.map(|n| n.trim().to_string()),
            position: self.position,
            color: self.color,
        })
    }
}

impl CreateTicketRequest {
    pub fn validate(self) -> Result<NewTicket, CrmError> {
        let mut errors = Vec::new();
        check_text(&mut errors, "title", "Title", &self.title, 255);
        let customer_id = parse_id(&mut errors, "customer_id", "customer", &self.customer_id);
        let column_id = parse_id(&mut errors, "kanban_column_id", "column", &self.kanban_column_id);
        let priority = match &self.priority {
            Some(p) => parse_enum::<Priority>(&mut errors, "priority", p),
            None => Some(Priority::default()),
        };
        let category = match &self.category {
            Some(c) => parse_enum::<Category>(&mut errors, "category", c),
            None => Some(Category::default()),
        };
        if let Some(due) = &self.due_date {
            check_due_date(&mut errors, due);
        }
        match (customer_id, column_id, priority, category) {
            (Some(customer_id), Some(kanban_column_id), Some(priority), Some(category))
                if errors.is_empty() =>
            {
                Ok(NewTicket {
                    title: self.title.trim().to_string(),
                    description: self.description,
                    customer_id,
                    kanban_column_id,
                    priority,
                    category,
                    assigned_to: self.assigned_to,
                    due_date: self.due_date,
                })
            }
            _ => Err(CrmError::Validation(errors)),
        }
    }
}

impl UpdateTicketRequest {
    pub fn validate(self) -> Result<TicketChanges, CrmError> {
        let mut errors = Vec::new();
        if self.kanban_column_id.is_some() {
            errors.push(FieldError::new(
                "kanban_column_id",
                "Column changes go through PATCH /api/tickets/:id or /api/board/moves",
            ));
        }
        if let Some(title) = &self.title {
            check_text(&mut errors, "title", "Title", title, 255);
        }
        let customer_id = self
            .customer_id
            .as_deref()
            .and_then(|c| parse_id(&mut errors, "customer_id", "customer", c));
        let priority = self
            .priority
            .as_deref()
            .and_then(|p| parse_enum::<Priority>(&mut errors, "priority", p));
        let category = self
            .category
            .as_deref()
            .and_then(|c| parse_enum::<Category>(&mut errors, "category", c));
        if let Some(due) = &self.due_date {
            check_due_date(&mut errors, due);
        }
        finish(errors, || TicketChanges {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description,
            customer_id,
            priority,
            category,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
        })
    }
}

impl PatchTicketRequest {
    pub fn validate(self) -> Result<PlacementPatch, CrmError> {
        let mut errors = Vec::new();
        let status = self
            .status
            .as_deref()
            .and_then(|s| parse_enum::<TicketStatus>(&mut errors, "status", s));
        let column_id = self
            .kanban_column_id
            .as_deref()
            .and_then(|c| parse_id(&mut errors, "kanban_column_id", "column", c));
        if !errors.is_empty() {
            return Err(CrmError::Validation(errors));
        }
        PlacementPatch::classify(column_id, self.order_in_column, status)
    }
}

impl PlacementPatch {
    /// Sort placement fields into a column move or a reorder. Shared by the
    /// PATCH route and the database ticket store.
    pub fn classify(
        column_id: Option<Uuid>,
        order_in_column: Option<i64>,
        status: Option<TicketStatus>,
    ) -> Result<Self, CrmError> {
        if let Some(order) = order_in_column {
            let mut errors = Vec::new();
            check_position(&mut errors, "order_in_column", "Order", order);
            if !errors.is_empty() {
                return Err(CrmError::Validation(errors));
            }
        }
        match (column_id, order_in_column) {
            (Some(kanban_column_id), Some(order_in_column)) => Ok(PlacementPatch::Column {
                kanban_column_id,
                order_in_column,
                expected_status: status,
            }),
            (Some(_), None) => Err(CrmError::invalid(
                "order_in_column",
                "Order is required when moving to a column",
            )),
            (None, Some(order_in_column)) if status.is_none() => {
                Ok(PlacementPatch::Order { order_in_column })
            }
            (None, _) if status.is_some() => Err(CrmError::invalid(
                "status",
                "Status is derived from the ticket's column",
            )),
            _ => Err(CrmError::invalid(
                "kanban_column_id",
                "Patch must carry kanban_column_id or order_in_column",
            )),
        }
    }
}

impl TryFrom<&TicketPatch> for PlacementPatch {
    type Error = CrmError;

    fn try_from(patch: &TicketPatch) -> Result<Self, Self::Error> {
        Self::classify(patch.kanban_column_id, patch.order_in_column, patch.status)
    }
}

impl CreateMessageRequest {
    pub fn validate(self) -> Result<NewMessage, CrmError> {
        let mut errors = Vec::new();
        let sender_type = parse_enum::<SenderType>(&mut errors, "sender_type", &self.sender_type);
        if self.message.trim().is_empty() {
            errors.push(FieldError::new("message", "Message is required"));
        }
        match sender_type {
            Some(sender_type) if errors.is_empty() => Ok(NewMessage {
                sender_type,
                message: self.message,
            }),
            _ => Err(CrmError::Validation(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(err: CrmError) -> Vec<String> {
        match err {
            CrmError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_create_customer_collects_all_errors() {
        let req = CreateCustomerRequest {
            name: "  ".into(),
            email: "not-an-email".into(),
            phone: None,
            company: None,
            notes: None,
        };
        assert_eq!(field_names(req.validate().unwrap_err()), vec!["name", "email"]);
    }

    #[test]
    fn test_create_customer_trims_and_accepts() {
        let req = CreateCustomerRequest {
            name: " Ana Souza ".into(),
            email: "ana@example.com".into(),
            phone: Some("+55 11 5555-0000".into()),
            company: None,
            notes: None,
        };
        let customer = req.validate().unwrap();
        assert_eq!(customer.name, "Ana Souza");
        assert_eq!(customer.email, "ana@example.com");
    }

    #[test]
    fn test_name_length_limits() {
        let req = CreateColumnRequest {
            name: "x".repeat(101),
            position: 0,
            color: None,
        };
        assert_eq!(field_names(req.validate().unwrap_err()), vec!["name"]);

        let req = CreateColumnRequest {
            name: "Em Andamento".into(),
            position: -1,
            color: None,
        };
        assert_eq!(field_names(req.validate().unwrap_err()), vec!["position"]);
    }

    #[test]
    fn test_create_ticket_defaults_priority_and_category() {
        let req = CreateTicketRequest {
            title: "Cannot log in".into(),
            description: None,
            customer_id: Uuid::new_v4().to_string(),
            kanban_column_id: Uuid::new_v4().to_string(),
            priority: None,
            category: None,
            assigned_to: None,
            due_date: None,
        };
        let ticket = req.validate().unwrap();
        assert_eq!(ticket.priority, Priority::Medium);
        assert_eq!(ticket.category, Category::General);
    }

    #[test]
    fn test_create_ticket_rejects_bad_ids_and_enums() {
        let req = CreateTicketRequest {
            title: "Cannot log in".into(),
            description: None,
            customer_id: "42".into(),
            kanban_column_id: Uuid::new_v4().to_string(),
            priority: Some("critical".into()),
            category: Some("misc".into()),
            assigned_to: None,
            due_date: None,
        };
        assert_eq!(
            field_names(req.validate().unwrap_err()),
            vec!["customer_id", "priority", "category"]
        );
    }

    #[test]
    fn test_due_date_formats() {
        let req = |due: &str| CreateTicketRequest {
            title: "Renewal call".into(),
            description: None,
            customer_id: Uuid::new_v4().to_string(),
            kanban_column_id: Uuid::new_v4().to_string(),
            priority: None,
            category: None,
            assigned_to: None,
            due_date: Some(due.into()),
        };
        assert!(req("2026-11-03").validate().is_ok());
        assert!(req("2026-11-03T17:00:00Z").validate().is_ok());
        assert_eq!(field_names(req("03/11/2026").validate().unwrap_err()), vec!["due_date"]);
        assert_eq!(field_names(req("2026-02-30").validate().unwrap_err()), vec!["due_date"]);

        let update = UpdateTicketRequest {
            due_date: Some("next week".into()),
            ..Default::default()
        };
        assert_eq!(field_names(update.validate().unwrap_err()), vec!["due_date"]);
    }

    #[test]
    fn test_update_ticket_rejects_column_change() {
        let req = UpdateTicketRequest {
            kanban_column_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        };
        assert_eq!(field_names(req.validate().unwrap_err()), vec!["kanban_column_id"]);
    }

    #[test]
    fn test_patch_classification() {
        let column = Uuid::new_v4();
        let req = PatchTicketRequest {
            kanban_column_id: Some(column.to_string()),
            order_in_column: Some(2),
            status: Some("in_progress".into()),
        };
        assert_eq!(
            req.validate().unwrap(),
            PlacementPatch::Column {
                kanban_column_id: column,
                order_in_column: 2,
                expected_status: Some(TicketStatus::InProgress),
            }
        );

        let req = PatchTicketRequest {
            order_in_column: Some(0),
            ..Default::default()
        };
        assert_eq!(
            req.validate().unwrap(),
            PlacementPatch::Order { order_in_column: 0 }
        );
    }

    #[test]
    fn test_patch_rejects_incomplete_payloads() {
        let status_only = PatchTicketRequest {
            status: Some("closed".into()),
            ..Default::default()
        };
        assert_eq!(field_names(status_only.validate().unwrap_err()), vec!["status"]);

        let column_without_order = PatchTicketRequest {
            kanban_column_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        };
        assert_eq!(
            field_names(column_without_order.validate().unwrap_err()),
            vec!["order_in_column"]
        );

        let empty = PatchTicketRequest::default();
        assert!(empty.validate().is_err());

        let negative = PatchTicketRequest {
            order_in_column: Some(-1),
            ..Default::default()
        };
        assert_eq!(
            field_names(negative.validate().unwrap_err()),
            vec!["order_in_column"]
        );
    }

    #[test]
    fn test_ticket_patch_uses_same_rules_as_route() {
        let column = Uuid::new_v4();
        assert_eq!(
            PlacementPatch::try_from(&TicketPatch::placement(column, 1, TicketStatus::Resolved))
                .unwrap(),
            PlacementPatch::Column {
                kanban_column_id: column,
                order_in_column: 1,
                expected_status: Some(TicketStatus::Resolved),
            }
        );

        let status_only = TicketPatch {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        assert_eq!(field_names(PlacementPatch::try_from(&status_only).unwrap_err()), vec!["status"]);
        assert_eq!(
            field_names(PlacementPatch::try_from(&TicketPatch::order(-1)).unwrap_err()),
            vec!["order_in_column"]
        );
        let column_only = TicketPatch {
            kanban_column_id: Some(column),
            ..Default::default()
        };
        assert_eq!(
            field_names(PlacementPatch::try_from(&column_only).unwrap_err()),
            vec!["order_in_column"]
        );
    }

    #[test]
    fn test_message_validation() {
        let req = CreateMessageRequest {
            sender_type: "support".into(),
            message: "We are looking into it".into(),
        };
        assert_eq!(req.validate().unwrap().sender_type, SenderType::Support);

        let req = CreateMessageRequest {
            sender_type: "robot".into(),
            message: " ".into(),
        };
        assert_eq!(
            field_names(req.validate().unwrap_err()),
            vec!["sender_type", "message"]
        );
    }
}
