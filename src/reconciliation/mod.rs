//! Fee total reconciliation engine
//!
//! The engine is the only writer of derived invoice state. Every operation
//! runs inside a single serializable transaction that covers both the
//! fee/invoice mutation and the verified-payment aggregate reads it is
//! computed from, so concurrent reconciliations against fees of the same
//! invoice are linearized by the storage backend. Transient commit conflicts
//! are retried a bounded number of times against fresh state.

use bigdecimal::BigDecimal;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Default number of automatic retries after a transaction conflict
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Reconciliation engine over a billing storage backend
pub struct ReconciliationEngine<S: BillingStorage> {
    storage: S,
    max_retries: u32,
}

impl<S: BillingStorage> ReconciliationEngine<S> {
    /// Create a new engine with the default retry budget
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create a new engine with a custom retry budget
    pub fn with_max_retries(storage: S, max_retries: u32) -> Self {
        Self {
            storage,
            max_retries,
        }
    }

    /// Change a fee's nominal total and reconcile the owning invoice.
    ///
    /// Fails with [`BillingError::FeeNotFound`] if the fee is missing or
    /// inactive, and with [`BillingError::InvalidAmount`] if `new_total` is
    /// below what has already been verified as paid against the fee. Both
    /// checks happen before any write. Returns the updated fee; the invoice
    /// is updated in the same transaction.
    pub async fn resize_fee(
        &mut self,
        fee_id: &str,
        new_total: BigDecimal,
    ) -> BillingResult<Fee> {
        validation::validate_non_negative_amount(&new_total)?;

        let mut attempt = 0;
        loop {
            match self.try_resize(fee_id, &new_total).await {
                Err(err) if err.is_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(fee_id, attempt, "fee resize hit a concurrent commit, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_resize(&mut self, fee_id: &str, new_total: &BigDecimal) -> BillingResult<Fee> {
        let mut tx = self.storage.begin().await?;

        let mut fee = tx
            .fee(fee_id)
            .await?
            .filter(|fee| fee.active)
            .ok_or_else(|| BillingError::FeeNotFound(fee_id.to_string()))?;
        let mut invoice = tx
            .invoice(&fee.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(fee.invoice_id.clone()))?;

        let fee_paid = tx.verified_total_for_fee(&fee.id).await?;
        if *new_total < fee_paid {
            return Err(BillingError::InvalidAmount(format!(
                "cannot reduce fee {} below the {} already verified as paid",
                fee.id, fee_paid
            )));
        }

        let zero = BigDecimal::from(0);
        let delta = new_total - &fee.total;

        // An increase reopens a fee that already has verified payments: it is
        // no longer counted as settled.
        if delta > zero && fee_paid > zero {
            invoice.fees_paid_out = invoice.fees_paid_out.saturating_sub(1);
        }

        invoice.total += &delta;
        fee.total = new_total.clone();

        let previous_status = fee.status;
        fee.status = SettlementStatus::derive(&fee.total, &fee_paid);
        // A discount that lands exactly on the verified amount settles the fee
        if fee.status == SettlementStatus::PaidOut && previous_status != SettlementStatus::PaidOut
        {
            invoice.fees_paid_out += 1;
        }

        let invoice_paid = tx.verified_total_for_invoice(&invoice.id).await?;
        invoice.status = SettlementStatus::derive(&invoice.total, &invoice_paid);

        fee.touch();
        invoice.touch();
        tx.save_fee(&fee).await?;
        tx.save_invoice(&invoice).await?;
        tx.commit().await?;

        tracing::debug!(fee_id, %delta, "fee resize committed");
        Ok(fee)
    }

    /// Verify a pending payment and reconcile the derived settlement state.
    ///
    /// Verification is guarded by the fee total: a payment that would push
    /// the verified sum above the fee's total fails with
    /// [`BillingError::InvalidAmount`]. Verifying an already verified payment
    /// is a no-op; a rejected payment cannot be verified.
    pub async fn verify_payment(&mut self, payment_id: &str) -> BillingResult<Payment> {
        let mut attempt = 0;
        loop {
            match self.try_verify(payment_id).await {
                Err(err) if err.is_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        payment_id,
                        attempt,
                        "payment verification hit a concurrent commit, retrying"
                    );
                }
                result => return result,
            }
        }
    }

    async fn try_verify(&mut self, payment_id: &str) -> BillingResult<Payment> {
        let mut tx = self.storage.begin().await?;

        let mut payment = tx
            .payment(payment_id)
            .await?
            .ok_or_else(|| BillingError::PaymentNotFound(payment_id.to_string()))?;
        match payment.status {
            PaymentStatus::Verified => return Ok(payment),
            PaymentStatus::Rejected => {
                return Err(BillingError::Validation(format!(
                    "payment {} was rejected and cannot be verified",
                    payment.id
                )));
            }
            PaymentStatus::Pending => {}
        }

        let mut fee = tx
            .fee(&payment.fee_id)
            .await?
            .ok_or_else(|| BillingError::FeeNotFound(payment.fee_id.clone()))?;
        if !fee.active {
            return Err(BillingError::Validation(format!(
                "fee {} is inactive and cannot accept payments",
                fee.id
            )));
        }
        let mut invoice = tx
            .invoice(&fee.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(fee.invoice_id.clone()))?;

        let fee_paid = tx.verified_total_for_fee(&fee.id).await?;
        let new_fee_paid = &fee_paid + &payment.amount;
        if new_fee_paid > fee.total {
            return Err(BillingError::InvalidAmount(format!(
                "verifying payment {} would put fee {} over its total",
                payment.id, fee.id
            )));
        }

        payment.status = PaymentStatus::Verified;
        payment.touch();
        tx.save_payment(&payment).await?;

        let previous_status = fee.status;
        fee.status = SettlementStatus::derive(&fee.total, &new_fee_paid);
        if fee.status == SettlementStatus::PaidOut && previous_status != SettlementStatus::PaidOut
        {
            invoice.fees_paid_out += 1;
        }
        fee.touch();
        tx.save_fee(&fee).await?;

        let invoice_paid = tx.verified_total_for_invoice(&invoice.id).await?;
        invoice.status = SettlementStatus::derive(&invoice.total, &invoice_paid);
        invoice.touch();
        tx.save_invoice(&invoice).await?;
        tx.commit().await?;

        tracing::debug!(payment_id, "payment verification committed");
        Ok(payment)
    }

    /// Activate or deactivate a fee, moving its total into or out of the
    /// owning invoice's aggregate.
    ///
    /// Deactivation is refused for a fee with verified payments. A call that
    /// matches the fee's current flag is a no-op.
    pub async fn set_fee_active(&mut self, fee_id: &str, active: bool) -> BillingResult<Fee> {
        let mut attempt = 0;
        loop {
            match self.try_set_active(fee_id, active).await {
                Err(err) if err.is_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(fee_id, attempt, "fee activation hit a concurrent commit, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_set_active(&mut self, fee_id: &str, active: bool) -> BillingResult<Fee> {
        let mut tx = self.storage.begin().await?;

        let mut fee = tx
            .fee(fee_id)
            .await?
            .ok_or_else(|| BillingError::FeeNotFound(fee_id.to_string()))?;
        if fee.active == active {
            return Ok(fee);
        }
        let mut invoice = tx
            .invoice(&fee.invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(fee.invoice_id.clone()))?;

        if active {
            invoice.total += &fee.total;
        } else {
            let fee_paid = tx.verified_total_for_fee(&fee.id).await?;
            if fee_paid > BigDecimal::from(0) {
                return Err(BillingError::Validation(format!(
                    "cannot deactivate fee {} with verified payments",
                    fee.id
                )));
            }
            invoice.total -= &fee.total;
        }

        fee.active = active;
        fee.touch();
        tx.save_fee(&fee).await?;

        let invoice_paid = tx.verified_total_for_invoice(&invoice.id).await?;
        invoice.status = SettlementStatus::derive(&invoice.total, &invoice_paid);
        invoice.touch();
        tx.save_invoice(&invoice).await?;
        tx.commit().await?;

        Ok(fee)
    }
}
