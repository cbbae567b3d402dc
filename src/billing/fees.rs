//! Fee read adapters
//!
//! Fee mutations (resizing, activation) go through the reconciliation engine
//! because they move derived invoice state; this manager only reads.

use crate::traits::*;
use crate::types::*;

/// Fee manager for fetch and listing operations
pub struct FeeManager<S: BillingStorage> {
    storage: S,
}

impl<S: BillingStorage> FeeManager<S> {
    /// Create a new fee manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Get a fee by ID
    pub async fn get_fee(&self, fee_id: &str) -> BillingResult<Option<Fee>> {
        self.storage.get_fee(fee_id).await
    }

    /// Get a fee by ID, returning an error if not found
    pub async fn get_fee_required(&self, fee_id: &str) -> BillingResult<Fee> {
        self.storage
            .get_fee(fee_id)
            .await?
            .ok_or_else(|| BillingError::FeeNotFound(fee_id.to_string()))
    }

    /// Get an active fee by ID, returning an error if missing or inactive
    pub async fn get_active_fee(&self, fee_id: &str) -> BillingResult<Fee> {
        self.storage
            .get_fee(fee_id)
            .await?
            .filter(|fee| fee.active)
            .ok_or_else(|| BillingError::FeeNotFound(fee_id.to_string()))
    }

    /// List all fees of an invoice in schedule order
    pub async fn find_by_invoice(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        self.storage.list_invoice_fees(invoice_id).await
    }

    /// List the active, not yet settled fees of an invoice in schedule order
    pub async fn find_open_by_invoice(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        let fees = self.storage.list_invoice_fees(invoice_id).await?;
        Ok(fees
            .into_iter()
            .filter(|fee| fee.active && fee.status != SettlementStatus::PaidOut)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use bigdecimal::BigDecimal;

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    async fn seed() -> (MemoryStorage, FeeManager<MemoryStorage>) {
        let mut storage = MemoryStorage::new();
        let invoice = Invoice::new("inv1".to_string(), dec(300));
        storage.save_invoice(&invoice).await.unwrap();

        let open = Fee::new("fee1".to_string(), "inv1".to_string(), 1, dec(100));
        let mut settled = Fee::new("fee2".to_string(), "inv1".to_string(), 2, dec(100));
        settled.status = SettlementStatus::PaidOut;
        let mut inactive = Fee::new("fee3".to_string(), "inv1".to_string(), 3, dec(100));
        inactive.active = false;
        storage.save_fee(&open).await.unwrap();
        storage.save_fee(&settled).await.unwrap();
        storage.save_fee(&inactive).await.unwrap();

        (storage.clone(), FeeManager::new(storage))
    }

    #[tokio::test]
    async fn test_get_fee_required_and_active() {
        let (_, manager) = seed().await;

        assert_eq!(manager.get_fee_required("fee1").await.unwrap().id, "fee1");
        assert!(matches!(
            manager.get_fee_required("missing").await.unwrap_err(),
            BillingError::FeeNotFound(_)
        ));

        // An inactive fee is found by plain fetch, but not as an active fee
        assert!(manager.get_fee("fee3").await.unwrap().is_some());
        assert!(matches!(
            manager.get_active_fee("fee3").await.unwrap_err(),
            BillingError::FeeNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_find_open_skips_settled_and_inactive() {
        let (_, manager) = seed().await;

        let open = manager.find_open_by_invoice("inv1").await.unwrap();
        let ids: Vec<&str> = open.iter().map(|fee| fee.id.as_str()).collect();
        assert_eq!(ids, vec!["fee1"]);
    }
}
