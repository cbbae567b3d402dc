//! Traits for storage abstraction and transactional access

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::types::*;

/// Storage abstraction for the billing system
///
/// This trait allows the billing core to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these methods.
/// Plain CRUD access goes through the methods on this trait; the
/// reconciliation engine instead opens a [`BillingTransaction`] via
/// [`BillingStorage::begin`] so that its reads and writes share one
/// serializable scope.
#[async_trait]
pub trait BillingStorage: Send + Sync {
    /// Transaction handle type produced by this backend
    type Tx: BillingTransaction;

    /// Open a transaction at the strongest isolation the backend offers.
    ///
    /// Dropping the handle without committing rolls the transaction back,
    /// so every exit path either commits or discards all buffered writes.
    async fn begin(&self) -> BillingResult<Self::Tx>;

    /// Save an invoice to storage
    async fn save_invoice(&mut self, invoice: &Invoice) -> BillingResult<()>;

    /// Get an invoice by ID
    async fn get_invoice(&self, invoice_id: &str) -> BillingResult<Option<Invoice>>;

    /// Save a fee to storage
    async fn save_fee(&mut self, fee: &Fee) -> BillingResult<()>;

    /// Get a fee by ID
    async fn get_fee(&self, fee_id: &str) -> BillingResult<Option<Fee>>;

    /// List all fees belonging to an invoice, ordered by schedule number
    async fn list_invoice_fees(&self, invoice_id: &str) -> BillingResult<Vec<Fee>>;

    /// Save a payment to storage
    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()>;

    /// Get a payment by ID
    async fn get_payment(&self, payment_id: &str) -> BillingResult<Option<Payment>>;

    /// List all payments recorded against a fee
    async fn list_fee_payments(&self, fee_id: &str) -> BillingResult<Vec<Payment>>;
}

/// A single serializable transaction over the billing stores
///
/// Reads observe a snapshot consistent with the transaction's start plus the
/// transaction's own buffered writes. Writes are buffered and applied
/// atomically by [`BillingTransaction::commit`]; a concurrent committed writer
/// on the same invoice causes commit to fail with
/// [`BillingError::TransactionConflict`], in which case the caller must retry
/// against fresh state.
#[async_trait]
pub trait BillingTransaction: Send {
    /// Read a fee within the transaction
    async fn fee(&mut self, fee_id: &str) -> BillingResult<Option<Fee>>;

    /// Read an invoice within the transaction
    async fn invoice(&mut self, invoice_id: &str) -> BillingResult<Option<Invoice>>;

    /// Read a payment within the transaction
    async fn payment(&mut self, payment_id: &str) -> BillingResult<Option<Payment>>;

    /// Sum of VERIFIED payment amounts recorded against a fee
    async fn verified_total_for_fee(&mut self, fee_id: &str) -> BillingResult<BigDecimal>;

    /// Sum of VERIFIED payment amounts across all active fees of an invoice
    async fn verified_total_for_invoice(&mut self, invoice_id: &str)
        -> BillingResult<BigDecimal>;

    /// Buffer a fee write
    async fn save_fee(&mut self, fee: &Fee) -> BillingResult<()>;

    /// Buffer an invoice write
    async fn save_invoice(&mut self, invoice: &Invoice) -> BillingResult<()>;

    /// Buffer a payment write
    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()>;

    /// Validate and apply all buffered writes atomically
    async fn commit(self) -> BillingResult<()>;
}
