//! Core types and data structures for the billing system

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Settlement state shared by invoices and fees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    /// Nothing has been verified as paid yet
    Pending,
    /// Some, but not all, of the total has been verified as paid
    Partial,
    /// Verified payments cover the total exactly
    PaidOut,
}

impl SettlementStatus {
    /// Derive the settlement status from a total and the verified-paid amount.
    ///
    /// This is the single source of truth for status transitions. The engine
    /// recomputes statuses through this function after every mutation instead
    /// of toggling the stored field, so repeated resizes cannot drift.
    pub fn derive(total: &BigDecimal, verified_paid: &BigDecimal) -> Self {
        if *verified_paid == BigDecimal::from(0) {
            SettlementStatus::Pending
        } else if verified_paid == total {
            SettlementStatus::PaidOut
        } else {
            SettlementStatus::Partial
        }
    }
}

/// Verification state of a recorded payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Recorded but not yet verified; excluded from settlement totals
    Pending,
    /// Verified as received; the only state that counts toward settlement
    Verified,
    /// Rejected during verification; excluded from settlement totals
    Rejected,
}

/// Aggregate billing record composed of scheduled fees
///
/// `total`, `status`, and `fees_paid_out` are derived state: they are written
/// only by the reconciliation engine, never by CRUD adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: String,
    /// Sum of the totals of all active fees
    pub total: BigDecimal,
    /// Derived settlement status
    pub status: SettlementStatus,
    /// Count of fees currently considered fully settled
    pub fees_paid_out: u32,
    /// When the invoice was created
    pub created_at: NaiveDateTime,
    /// When the invoice was last updated
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    /// Create a new invoice with the given total
    pub fn new(id: String, total: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            total,
            status: SettlementStatus::Pending,
            fees_paid_out: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// A scheduled portion of an invoice's total, owed and tracked independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    /// Unique identifier for the fee
    pub id: String,
    /// Owning invoice
    pub invoice_id: String,
    /// Position within the invoice's payment schedule, starting at 1
    pub number: u32,
    /// Nominal amount owed for this fee
    pub total: BigDecimal,
    /// Derived settlement status
    pub status: SettlementStatus,
    /// Soft-delete flag; fees are deactivated, never deleted
    pub active: bool,
    /// When the fee was created
    pub created_at: NaiveDateTime,
    /// When the fee was last updated
    pub updated_at: NaiveDateTime,
}

impl Fee {
    /// Create a new active fee in the pending state
    pub fn new(id: String, invoice_id: String, number: u32, total: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            invoice_id,
            number,
            total,
            status: SettlementStatus::Pending,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// A recorded payment instance against a fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier for the payment
    pub id: String,
    /// Fee this payment settles
    pub fee_id: String,
    /// Amount paid
    pub amount: BigDecimal,
    /// Verification status
    pub status: PaymentStatus,
    /// When the payment was recorded
    pub created_at: NaiveDateTime,
    /// When the payment was last updated
    pub updated_at: NaiveDateTime,
}

impl Payment {
    /// Record a new payment pending verification
    pub fn new(id: String, fee_id: String, amount: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            fee_id,
            amount,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Errors that can occur in the billing system
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Fee not found: {0}")]
    FeeNotFound(String),
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl BillingError {
    /// Whether this error is transient and the operation can be retried
    /// against fresh state
    pub fn is_conflict(&self) -> bool {
        matches!(self, BillingError::TransactionConflict(_))
    }
}

/// Result type for billing operations
pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    #[test]
    fn test_status_derivation_pending() {
        assert_eq!(
            SettlementStatus::derive(&dec(100), &dec(0)),
            SettlementStatus::Pending
        );
    }

    #[test]
    fn test_status_derivation_partial() {
        assert_eq!(
            SettlementStatus::derive(&dec(100), &dec(40)),
            SettlementStatus::Partial
        );
    }

    #[test]
    fn test_status_derivation_paid_out() {
        assert_eq!(
            SettlementStatus::derive(&dec(100), &dec(100)),
            SettlementStatus::PaidOut
        );
    }

    #[test]
    fn test_status_derivation_zero_total() {
        // A zero-total fee with nothing paid is still pending, not settled
        assert_eq!(
            SettlementStatus::derive(&dec(0), &dec(0)),
            SettlementStatus::Pending
        );
    }

    #[test]
    fn test_status_serialization_matches_schema() {
        let json = serde_json::to_string(&SettlementStatus::PaidOut).unwrap();
        assert_eq!(json, "\"PAID_OUT\"");
        let json = serde_json::to_string(&PaymentStatus::Verified).unwrap();
        assert_eq!(json, "\"VERIFIED\"");
    }

    #[test]
    fn test_new_fee_defaults() {
        let fee = Fee::new("f1".to_string(), "i1".to_string(), 1, dec(100));
        assert!(fee.active);
        assert_eq!(fee.status, SettlementStatus::Pending);
        assert_eq!(fee.invoice_id, "i1");
    }

    #[test]
    fn test_conflict_classification() {
        assert!(BillingError::TransactionConflict("busy".to_string()).is_conflict());
        assert!(!BillingError::FeeNotFound("f1".to_string()).is_conflict());
    }
}
