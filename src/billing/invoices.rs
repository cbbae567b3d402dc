//! Invoice management functionality

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Invoice manager for issuing and reading invoices
pub struct InvoiceManager<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> InvoiceManager<S> {
    /// Create a new invoice manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Issue a new invoice with the given payment schedule.
    ///
    /// One fee is created per schedule amount, numbered in order starting at
    /// 1, and the invoice total is the sum of the schedule. All amounts must
    /// be positive.
    pub async fn issue(
        &mut self,
        schedule: Vec<BigDecimal>,
    ) -> BillingResult<(Invoice, Vec<Fee>)> {
        validation::validate_schedule(&schedule)?;

        let total: BigDecimal = schedule.iter().sum();
        let invoice = Invoice::new(Uuid::new_v4().to_string(), total);
        self.storage.save_invoice(&invoice).await?;

        let mut fees = Vec::with_capacity(schedule.len());
        for (index, amount) in schedule.into_iter().enumerate() {
            let fee = Fee::new(
                Uuid::new_v4().to_string(),
                invoice.id.clone(),
                index as u32 + 1,
                amount,
            );
            self.storage.save_fee(&fee).await?;
            fees.push(fee);
        }

        Ok((invoice, fees))
    }

    /// Get an invoice by ID
    pub async fn get_invoice(&self, invoice_id: &str) -> BillingResult<Option<Invoice>> {
        self.storage.get_invoice(invoice_id).await
    }

    /// Get an invoice by ID, returning an error if not found
    pub async fn get_invoice_required(&self, invoice_id: &str) -> BillingResult<Invoice> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// List an invoice's fees in schedule order
    pub async fn list_fees(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        self.storage.list_invoice_fees(invoice_id).await
    }
}
