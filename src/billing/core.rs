//! Main billing facade that coordinates invoices, fees, payments, and the
//! reconciliation engine

use bigdecimal::BigDecimal;

use crate::billing::{FeeManager, InvoiceManager, PaymentAggregator, PaymentManager};
use crate::reconciliation::ReconciliationEngine;
use crate::traits::*;
use crate::types::*;

/// Billing system facade over a single storage backend
pub struct Billing<S: BillingStorage> {
    invoices: InvoiceManager<S>,
    fees: FeeManager<S>,
    payments: PaymentManager<S>,
    aggregator: PaymentAggregator<S>,
    engine: ReconciliationEngine<S>,
}

impl<S: BillingStorage + Clone> Billing<S> {
    /// Create a new billing system with the given storage backend
    pub fn new(storage: S) -> Self {
        Self {
            invoices: InvoiceManager::new(storage.clone()),
            fees: FeeManager::new(storage.clone()),
            payments: PaymentManager::new(storage.clone()),
            aggregator: PaymentAggregator::new(storage.clone()),
            engine: ReconciliationEngine::new(storage),
        }
    }

    // Invoice operations
    /// Issue a new invoice from a payment schedule
    pub async fn issue_invoice(
        &mut self,
        schedule: Vec<BigDecimal>,
    ) -> BillingResult<(Invoice, Vec<Fee>)> {
        self.invoices.issue(schedule).await
    }

    /// Get an invoice by ID
    pub async fn get_invoice(&self, invoice_id: &str) -> BillingResult<Option<Invoice>> {
        self.invoices.get_invoice(invoice_id).await
    }

    /// Get an invoice by ID, returning an error if not found
    pub async fn get_invoice_required(&self, invoice_id: &str) -> BillingResult<Invoice> {
        self.invoices.get_invoice_required(invoice_id).await
    }

    // Fee operations
    /// Get a fee by ID
    pub async fn get_fee(&self, fee_id: &str) -> BillingResult<Option<Fee>> {
        self.fees.get_fee(fee_id).await
    }

    /// List all fees of an invoice in schedule order
    pub async fn list_invoice_fees(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        self.fees.find_by_invoice(invoice_id).await
    }

    /// List the active, not yet settled fees of an invoice
    pub async fn list_open_fees(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        self.fees.find_open_by_invoice(invoice_id).await
    }

    /// Resize a fee and reconcile the owning invoice atomically
    pub async fn resize_fee(&mut self, fee_id: &str, new_total: BigDecimal) -> BillingResult<Fee> {
        self.engine.resize_fee(fee_id, new_total).await
    }

    /// Activate or deactivate a fee
    pub async fn set_fee_active(&mut self, fee_id: &str, active: bool) -> BillingResult<Fee> {
        self.engine.set_fee_active(fee_id, active).await
    }

    // Payment operations
    /// Record a payment against a fee, pending verification
    pub async fn record_payment(
        &mut self,
        fee_id: &str,
        amount: BigDecimal,
    ) -> BillingResult<Payment> {
        self.payments.record_payment(fee_id, amount).await
    }

    /// Verify a pending payment and reconcile settlement state
    pub async fn verify_payment(&mut self, payment_id: &str) -> BillingResult<Payment> {
        self.engine.verify_payment(payment_id).await
    }

    /// Reject a pending payment
    pub async fn reject_payment(&mut self, payment_id: &str) -> BillingResult<Payment> {
        self.payments.reject_payment(payment_id).await
    }

    /// Get a payment by ID
    pub async fn get_payment(&self, payment_id: &str) -> BillingResult<Option<Payment>> {
        self.payments.get_payment(payment_id).await
    }

    // Aggregates
    /// Sum of verified payment amounts against a fee
    pub async fn verified_total_for_fee(&self, fee_id: &str) -> BillingResult<BigDecimal> {
        self.aggregator.verified_total_for_fee(fee_id).await
    }

    /// Sum of verified payment amounts across all active fees of an invoice
    pub async fn verified_total_for_invoice(
        &self,
        invoice_id: &str,
    ) -> BillingResult<BigDecimal> {
        self.aggregator.verified_total_for_invoice(invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    #[tokio::test]
    async fn test_billing_basic_workflow() {
        let storage = MemoryStorage::new();
        let mut billing = Billing::new(storage);

        let (invoice, fees) = billing
            .issue_invoice(vec![dec(100), dec(50)])
            .await
            .unwrap();
        assert_eq!(invoice.total, dec(150));

        let payment = billing.record_payment(&fees[0].id, dec(100)).await.unwrap();
        billing.verify_payment(&payment.id).await.unwrap();

        let fee = billing.get_fee(&fees[0].id).await.unwrap().unwrap();
        assert_eq!(fee.status, SettlementStatus::PaidOut);

        let invoice = billing.get_invoice_required(&invoice.id).await.unwrap();
        assert_eq!(invoice.status, SettlementStatus::Partial);
        assert_eq!(invoice.fees_paid_out, 1);
        assert_eq!(
            billing.verified_total_for_invoice(&invoice.id).await.unwrap(),
            dec(100)
        );

        let open = billing.list_open_fees(&invoice.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fees[1].id);
    }
}
