//! Payment recording and aggregation
//!
//! Recording and rejecting pending payments never touches settlement totals,
//! so they are plain CRUD here. Verification does, and is delegated to the
//! reconciliation engine.

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Payment manager for recording payments and terminal pending transitions
pub struct PaymentManager<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> PaymentManager<S> {
    /// Create a new payment manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Record a payment against an active fee, pending verification
    pub async fn record_payment(
        &mut self,
        fee_id: &str,
        amount: BigDecimal,
    ) -> BillingResult<Payment> {
        validation::validate_positive_amount(&amount)?;

        let fee = self
            .storage
            .get_fee(fee_id)
            .await?
            .filter(|fee| fee.active)
            .ok_or_else(|| BillingError::FeeNotFound(fee_id.to_string()))?;

        let payment = Payment::new(Uuid::new_v4().to_string(), fee.id, amount);
        self.storage.save_payment(&payment).await?;

        Ok(payment)
    }

    /// Reject a pending payment.
    ///
    /// A verified payment cannot be rejected; reversing verified money is a
    /// refund, which this system does not model.
    pub async fn reject_payment(&mut self, payment_id: &str) -> BillingResult<Payment> {
        let mut payment = self
            .storage
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BillingError::PaymentNotFound(payment_id.to_string()))?;

        match payment.status {
            PaymentStatus::Rejected => return Ok(payment),
            PaymentStatus::Verified => {
                return Err(BillingError::Validation(format!(
                    "payment {} is verified and cannot be rejected",
                    payment.id
                )));
            }
            PaymentStatus::Pending => {}
        }

        payment.status = PaymentStatus::Rejected;
        payment.touch();
        self.storage.save_payment(&payment).await?;

        Ok(payment)
    }

    /// Get a payment by ID
    pub async fn get_payment(&self, payment_id: &str) -> BillingResult<Option<Payment>> {
        self.storage.get_payment(payment_id).await
    }

    /// List all payments recorded against a fee
    pub async fn list_fee_payments(&self, fee_id: &str) -> BillingResult<Vec<Payment>> {
        self.storage.list_fee_payments(fee_id).await
    }
}

/// Verified-payment totals computed outside a transaction.
///
/// Adapters use this for display and reporting. The reconciliation engine
/// never does: its correctness depends on taking these aggregates inside the
/// same transaction as the mutation, through [`BillingTransaction`].
pub struct PaymentAggregator<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> PaymentAggregator<S> {
    /// Create a new aggregator
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Sum of VERIFIED payment amounts against a fee
    pub async fn verified_total_for_fee(&self, fee_id: &str) -> BillingResult<BigDecimal> {
        let payments = self.storage.list_fee_payments(fee_id).await?;
        Ok(payments
            .iter()
            .filter(|payment| payment.status == PaymentStatus::Verified)
            .map(|payment| &payment.amount)
            .sum())
    }

    /// Sum of VERIFIED payment amounts across all active fees of an invoice
    pub async fn verified_total_for_invoice(
        &self,
        invoice_id: &str,
    ) -> BillingResult<BigDecimal> {
        let fees = self.storage.list_invoice_fees(invoice_id).await?;
        let mut total = BigDecimal::from(0);
        for fee in fees.iter().filter(|fee| fee.active) {
            total += self.verified_total_for_fee(&fee.id).await?;
        }
        Ok(total)
    }
}
