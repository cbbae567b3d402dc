//! Billing module containing invoice, fee, and payment management

pub mod core;
pub mod fees;
pub mod invoices;
pub mod payments;

pub use self::core::*;
pub use fees::*;
pub use invoices::*;
pub use payments::*;
