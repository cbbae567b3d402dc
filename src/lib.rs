//! # Billing Core
//!
//! A project billing library tracking invoices split into scheduled fees,
//! each fee settled by one or more verified payments.
//!
//! ## Features
//!
//! - **Invoice scheduling**: issue an invoice as a numbered schedule of fees
//! - **Payment tracking**: record, verify, and reject payments against fees
//! - **Fee reconciliation**: resize a fee and recompute the owning invoice's
//!   total and settlement statuses as one atomic transaction
//! - **Concurrency safety**: reconciliations of fees on the same invoice are
//!   linearized through serializable transactions with bounded retry
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   storage and an in-memory backend for testing
//!
//! ## Quick Start
//!
//! ```rust
//! use billing_core::{Billing, BillingResult, utils::MemoryStorage};
//! use bigdecimal::BigDecimal;
//!
//! async fn example() -> BillingResult<()> {
//!     let mut billing = Billing::new(MemoryStorage::new());
//!     let (_invoice, fees) = billing
//!         .issue_invoice(vec![BigDecimal::from(100), BigDecimal::from(50)])
//!         .await?;
//!     let fee = billing.resize_fee(&fees[0].id, BigDecimal::from(150)).await?;
//!     assert_eq!(fee.total, BigDecimal::from(150));
//!     Ok(())
//! }
//! ```

pub mod billing;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use billing::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
