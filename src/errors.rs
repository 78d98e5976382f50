//! Typed error hierarchy for the helpdesk service.
//!
//! Two enums cover the two seams:
//! - `CrmError`: domain lookups, validation and database failures
//! - `StoreError`: a single ticket-store update call made by the placement engine

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// One rejected field of a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the CRM data layer and request validation.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Customer {id} not found")]
    CustomerNotFound { id: Uuid },

    #[error("Ticket {id} not found")]
    TicketNotFound { id: Uuid },

    #[error("Kanban column {id} not found")]
    ColumnNotFound { id: Uuid },

    #[error("Kanban column {id} still holds {tickets} ticket(s)")]
    ColumnInUse { id: Uuid, tickets: usize },

    #[error("Invalid data: {}", join_messages(.0))]
    Validation(Vec<FieldError>),
}

impl CrmError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotFound { .. } | Self::TicketNotFound { .. } | Self::ColumnNotFound { .. }
        )
    }
}

/// Errors from one ticket-store update call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Ticket {id} not found")]
    NotFound { id: Uuid },

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Ticket store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_error_ticket_not_found_carries_id() {
        let id = Uuid::new_v4();
        let err = CrmError::TicketNotFound { id };
        match &err {
            CrmError::TicketNotFound { id: got } => assert_eq!(*got, id),
            _ => panic!("Expected TicketNotFound"),
        }
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.is_not_found());
    }

    #[test]
    fn validation_error_joins_field_messages() {
        let err = CrmError::Validation(vec![
            FieldError::new("name", "Name is required"),
            FieldError::new("email", "Invalid email"),
        ]);
        assert_eq!(err.to_string(), "Invalid data: Name is required, Invalid email");
        assert!(!err.is_not_found());
    }

    #[test]
    fn crm_error_survives_anyhow_roundtrip() {
        let id = Uuid::new_v4();
        let err: anyhow::Error = CrmError::ColumnNotFound { id }.into();
        let recovered = err.downcast_ref::<CrmError>();
        assert!(matches!(recovered, Some(CrmError::ColumnNotFound { .. })));
    }

    #[test]
    fn store_error_variants_are_distinct() {
        let id = Uuid::new_v4();
        assert_ne!(
            StoreError::NotFound { id },
            StoreError::Rejected("x".into())
        );
        assert!(StoreError::Unavailable("timeout".into())
            .to_string()
            .contains("timeout"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&CrmError::invalid("title", "Title is required"));
        assert_std_error(&StoreError::Rejected("no".into()));
    }
}
