//! In-memory storage implementation for testing and development
//!
//! Serializable isolation is approximated with optimistic concurrency
//! control: every invoice carries a version counter, a transaction snapshots
//! the stores at begin, and commit validates that no invoice touched by the
//! transaction's reads or writes has been committed by anyone else in the
//! meantime. The invoice is the unit of contention, so fees and payments
//! validate through their owning invoice's version.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct StoreInner {
    invoices: HashMap<String, Invoice>,
    fees: HashMap<String, Fee>,
    payments: HashMap<String, Payment>,
    invoice_versions: HashMap<String, u64>,
}

impl StoreInner {
    fn version(&self, invoice_id: &str) -> u64 {
        self.invoice_versions.get(invoice_id).copied().unwrap_or(0)
    }

    fn bump(&mut self, invoice_id: &str) {
        *self
            .invoice_versions
            .entry(invoice_id.to_string())
            .or_insert(0) += 1;
    }

    /// Resolve the invoice a payment belongs to, through its fee
    fn payment_invoice(&self, payment: &Payment) -> Option<String> {
        self.fees
            .get(&payment.fee_id)
            .map(|fee| fee.invoice_id.clone())
    }
}

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.invoices.clear();
        inner.fees.clear();
        inner.payments.clear();
        inner.invoice_versions.clear();
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingStorage for MemoryStorage {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> BillingResult<MemoryTransaction> {
        let snapshot = self.inner.read().unwrap().clone();
        Ok(MemoryTransaction {
            store: Arc::clone(&self.inner),
            snapshot,
            touched: HashSet::new(),
            pending_invoices: HashMap::new(),
            pending_fees: HashMap::new(),
            pending_payments: HashMap::new(),
        })
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> BillingResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .invoices
            .insert(invoice.id.clone(), invoice.clone());
        inner.bump(&invoice.id);
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: &str) -> BillingResult<Option<Invoice>> {
        Ok(self.inner.read().unwrap().invoices.get(invoice_id).cloned())
    }

    async fn save_fee(&mut self, fee: &Fee) -> BillingResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.fees.insert(fee.id.clone(), fee.clone());
        inner.bump(&fee.invoice_id);
        Ok(())
    }

    async fn get_fee(&self, fee_id: &str) -> BillingResult<Option<Fee>> {
        Ok(self.inner.read().unwrap().fees.get(fee_id).cloned())
    }

    async fn list_invoice_fees(&self, invoice_id: &str) -> BillingResult<Vec<Fee>> {
        let inner = self.inner.read().unwrap();
        let mut fees: Vec<Fee> = inner
            .fees
            .values()
            .filter(|fee| fee.invoice_id == invoice_id)
            .cloned()
            .collect();
        fees.sort_by_key(|fee| fee.number);
        Ok(fees)
    }

    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(invoice_id) = inner.payment_invoice(payment) {
            inner.bump(&invoice_id);
        }
        inner
            .payments
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> BillingResult<Option<Payment>> {
        Ok(self.inner.read().unwrap().payments.get(payment_id).cloned())
    }

    async fn list_fee_payments(&self, fee_id: &str) -> BillingResult<Vec<Payment>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .payments
            .values()
            .filter(|payment| payment.fee_id == fee_id)
            .cloned()
            .collect())
    }
}

/// Optimistic transaction over [`MemoryStorage`]
///
/// Reads come from the snapshot taken at begin, overlaid with this
/// transaction's own buffered writes. Dropping the transaction without
/// committing discards the buffer.
pub struct MemoryTransaction {
    store: Arc<RwLock<StoreInner>>,
    snapshot: StoreInner,
    /// Invoice ids whose state this transaction depends on
    touched: HashSet<String>,
    pending_invoices: HashMap<String, Invoice>,
    pending_fees: HashMap<String, Fee>,
    pending_payments: HashMap<String, Payment>,
}

impl MemoryTransaction {
    fn read_invoice(&mut self, invoice_id: &str) -> Option<Invoice> {
        self.touched.insert(invoice_id.to_string());
        self.pending_invoices
            .get(invoice_id)
            .or_else(|| self.snapshot.invoices.get(invoice_id))
            .cloned()
    }

    fn read_fee(&mut self, fee_id: &str) -> Option<Fee> {
        let fee = self
            .pending_fees
            .get(fee_id)
            .or_else(|| self.snapshot.fees.get(fee_id))
            .cloned();
        if let Some(ref fee) = fee {
            self.touched.insert(fee.invoice_id.clone());
        }
        fee
    }

    /// Iterate payments as this transaction sees them
    fn visible_payments(&self) -> impl Iterator<Item = &Payment> {
        self.snapshot
            .payments
            .values()
            .filter(|payment| !self.pending_payments.contains_key(&payment.id))
            .chain(self.pending_payments.values())
    }

    fn fee_invoice_id(&self, fee_id: &str) -> Option<String> {
        self.pending_fees
            .get(fee_id)
            .or_else(|| self.snapshot.fees.get(fee_id))
            .map(|fee| fee.invoice_id.clone())
    }
}

#[async_trait]
impl BillingTransaction for MemoryTransaction {
    async fn fee(&mut self, fee_id: &str) -> BillingResult<Option<Fee>> {
        Ok(self.read_fee(fee_id))
    }

    async fn invoice(&mut self, invoice_id: &str) -> BillingResult<Option<Invoice>> {
        Ok(self.read_invoice(invoice_id))
    }

    async fn payment(&mut self, payment_id: &str) -> BillingResult<Option<Payment>> {
        let payment = self
            .pending_payments
            .get(payment_id)
            .or_else(|| self.snapshot.payments.get(payment_id))
            .cloned();
        if let Some(ref payment) = payment {
            if let Some(invoice_id) = self.fee_invoice_id(&payment.fee_id) {
                self.touched.insert(invoice_id);
            }
        }
        Ok(payment)
    }

    async fn verified_total_for_fee(&mut self, fee_id: &str) -> BillingResult<BigDecimal> {
        if let Some(invoice_id) = self.fee_invoice_id(fee_id) {
            self.touched.insert(invoice_id);
        }
        let total = self
            .visible_payments()
            .filter(|payment| payment.fee_id == fee_id)
            .filter(|payment| payment.status == PaymentStatus::Verified)
            .map(|payment| &payment.amount)
            .sum();
        Ok(total)
    }

    async fn verified_total_for_invoice(
        &mut self,
        invoice_id: &str,
    ) -> BillingResult<BigDecimal> {
        self.touched.insert(invoice_id.to_string());
        let active_fees: HashSet<String> = self
            .snapshot
            .fees
            .values()
            .filter(|fee| !self.pending_fees.contains_key(&fee.id))
            .chain(self.pending_fees.values())
            .filter(|fee| fee.invoice_id == invoice_id && fee.active)
            .map(|fee| fee.id.clone())
            .collect();
        let total = self
            .visible_payments()
            .filter(|payment| active_fees.contains(&payment.fee_id))
            .filter(|payment| payment.status == PaymentStatus::Verified)
            .map(|payment| &payment.amount)
            .sum();
        Ok(total)
    }

    async fn save_fee(&mut self, fee: &Fee) -> BillingResult<()> {
        self.touched.insert(fee.invoice_id.clone());
        self.pending_fees.insert(fee.id.clone(), fee.clone());
        Ok(())
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> BillingResult<()> {
        self.touched.insert(invoice.id.clone());
        self.pending_invoices
            .insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()> {
        if let Some(invoice_id) = self.fee_invoice_id(&payment.fee_id) {
            self.touched.insert(invoice_id);
        }
        self.pending_payments
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn commit(self) -> BillingResult<()> {
        let mut inner = self.store.write().unwrap();

        // First-committer-wins validation over every invoice we depended on
        for invoice_id in &self.touched {
            if inner.version(invoice_id) != self.snapshot.version(invoice_id) {
                return Err(BillingError::TransactionConflict(format!(
                    "invoice {} was modified by a concurrent transaction",
                    invoice_id
                )));
            }
        }

        let mut written: HashSet<String> = HashSet::new();
        for invoice in self.pending_invoices.values() {
            written.insert(invoice.id.clone());
        }
        for fee in self.pending_fees.values() {
            written.insert(fee.invoice_id.clone());
        }
        for payment in self.pending_payments.values() {
            if let Some(invoice_id) = self
                .pending_fees
                .get(&payment.fee_id)
                .or_else(|| self.snapshot.fees.get(&payment.fee_id))
                .map(|fee| fee.invoice_id.clone())
            {
                written.insert(invoice_id);
            }
        }

        for (id, invoice) in self.pending_invoices {
            inner.invoices.insert(id, invoice);
        }
        for (id, fee) in self.pending_fees {
            inner.fees.insert(id, fee);
        }
        for (id, payment) in self.pending_payments {
            inner.payments.insert(id, payment);
        }
        for invoice_id in &written {
            inner.bump(invoice_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    async fn seed(storage: &mut MemoryStorage) -> (Invoice, Fee) {
        let invoice = Invoice::new("inv1".to_string(), dec(100));
        let fee = Fee::new("fee1".to_string(), "inv1".to_string(), 1, dec(100));
        storage.save_invoice(&invoice).await.unwrap();
        storage.save_fee(&fee).await.unwrap();
        (invoice, fee)
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let mut storage = MemoryStorage::new();
        let (invoice, fee) = seed(&mut storage).await;

        assert_eq!(
            storage.get_invoice("inv1").await.unwrap(),
            Some(invoice)
        );
        assert_eq!(storage.get_fee("fee1").await.unwrap(), Some(fee));
        assert!(storage.get_fee("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_invoice_fees_ordered_by_number() {
        let mut storage = MemoryStorage::new();
        let invoice = Invoice::new("inv1".to_string(), dec(300));
        storage.save_invoice(&invoice).await.unwrap();
        for number in [3u32, 1, 2] {
            let fee = Fee::new(
                format!("fee{}", number),
                "inv1".to_string(),
                number,
                dec(100),
            );
            storage.save_fee(&fee).await.unwrap();
        }

        let fees = storage.list_invoice_fees("inv1").await.unwrap();
        let numbers: Vec<u32> = fees.iter().map(|fee| fee.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_transaction_reads_snapshot_and_buffers_writes() {
        let mut storage = MemoryStorage::new();
        let (_, mut fee) = seed(&mut storage).await;

        let mut tx = storage.begin().await.unwrap();
        fee.total = dec(150);
        tx.save_fee(&fee).await.unwrap();

        // The buffered write is visible inside the transaction only
        assert_eq!(tx.fee("fee1").await.unwrap().unwrap().total, dec(150));
        assert_eq!(
            storage.get_fee("fee1").await.unwrap().unwrap().total,
            dec(100)
        );

        tx.commit().await.unwrap();
        assert_eq!(
            storage.get_fee("fee1").await.unwrap().unwrap().total,
            dec(150)
        );
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let mut storage = MemoryStorage::new();
        let (_, mut fee) = seed(&mut storage).await;

        {
            let mut tx = storage.begin().await.unwrap();
            fee.total = dec(999);
            tx.save_fee(&fee).await.unwrap();
        }

        assert_eq!(
            storage.get_fee("fee1").await.unwrap().unwrap().total,
            dec(100)
        );
    }

    #[tokio::test]
    async fn test_concurrent_commit_on_same_invoice_conflicts() {
        let mut storage = MemoryStorage::new();
        let (mut invoice, _) = seed(&mut storage).await;

        let mut first = storage.begin().await.unwrap();
        let mut second = storage.begin().await.unwrap();

        invoice.total = dec(150);
        first.invoice("inv1").await.unwrap();
        first.save_invoice(&invoice).await.unwrap();

        second.invoice("inv1").await.unwrap();
        invoice.total = dec(200);
        second.save_invoice(&invoice).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_disjoint_invoices_commit_independently() {
        let mut storage = MemoryStorage::new();
        let invoice_a = Invoice::new("a".to_string(), dec(100));
        let invoice_b = Invoice::new("b".to_string(), dec(100));
        storage.save_invoice(&invoice_a).await.unwrap();
        storage.save_invoice(&invoice_b).await.unwrap();

        let mut first = storage.begin().await.unwrap();
        let mut second = storage.begin().await.unwrap();

        let mut a = first.invoice("a").await.unwrap().unwrap();
        a.total = dec(150);
        first.save_invoice(&a).await.unwrap();

        let mut b = second.invoice("b").await.unwrap().unwrap();
        b.total = dec(175);
        second.save_invoice(&b).await.unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        assert_eq!(
            storage.get_invoice("a").await.unwrap().unwrap().total,
            dec(150)
        );
        assert_eq!(
            storage.get_invoice("b").await.unwrap().unwrap().total,
            dec(175)
        );
    }

    #[tokio::test]
    async fn test_aggregate_read_conflicts_with_payment_write() {
        let mut storage = MemoryStorage::new();
        let (_, fee) = seed(&mut storage).await;

        let mut tx = storage.begin().await.unwrap();
        tx.verified_total_for_invoice("inv1").await.unwrap();
        let mut invoice = tx.invoice("inv1").await.unwrap().unwrap();
        invoice.total = dec(150);
        tx.save_invoice(&invoice).await.unwrap();

        // A payment lands on the same invoice after our snapshot
        let mut payment = Payment::new("p1".to_string(), fee.id.clone(), dec(40));
        payment.status = PaymentStatus::Verified;
        storage.save_payment(&payment).await.unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_verified_totals_exclude_pending_and_rejected() {
        let mut storage = MemoryStorage::new();
        let (_, fee) = seed(&mut storage).await;

        let mut verified = Payment::new("p1".to_string(), fee.id.clone(), dec(40));
        verified.status = PaymentStatus::Verified;
        let pending = Payment::new("p2".to_string(), fee.id.clone(), dec(25));
        let mut rejected = Payment::new("p3".to_string(), fee.id.clone(), dec(10));
        rejected.status = PaymentStatus::Rejected;
        storage.save_payment(&verified).await.unwrap();
        storage.save_payment(&pending).await.unwrap();
        storage.save_payment(&rejected).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.verified_total_for_fee("fee1").await.unwrap(), dec(40));
        assert_eq!(
            tx.verified_total_for_invoice("inv1").await.unwrap(),
            dec(40)
        );
    }

    #[tokio::test]
    async fn test_invoice_aggregate_ignores_inactive_fees() {
        let mut storage = MemoryStorage::new();
        let (_, _) = seed(&mut storage).await;
        let mut inactive = Fee::new("fee2".to_string(), "inv1".to_string(), 2, dec(50));
        inactive.active = false;
        storage.save_fee(&inactive).await.unwrap();

        let mut payment = Payment::new("p1".to_string(), "fee2".to_string(), dec(50));
        payment.status = PaymentStatus::Verified;
        storage.save_payment(&payment).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(
            tx.verified_total_for_invoice("inv1").await.unwrap(),
            dec(0)
        );
    }
}
