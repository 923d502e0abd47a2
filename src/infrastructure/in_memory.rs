use crate::domain::invoice::{Invoice, InvoiceId, InvoiceStatus};
use crate::domain::ports::InvoiceRepository;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A thread-safe in-memory invoice repository.
///
/// Uses `Arc<RwLock<BTreeMap<InvoiceId, Invoice>>>` so that every listing comes
/// back ordered by invoice id. Ideal for testing or for runs where persistence
/// is not required.
#[derive(Default, Clone)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<BTreeMap<InvoiceId, Invoice>>>,
    status_writes: Arc<AtomicUsize>,
    concurrent_writes: bool,
}

impl InMemoryInvoiceRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares whether callers may skip write serialization for this store.
    pub fn with_concurrent_writes(mut self, enabled: bool) -> Self {
        self.concurrent_writes = enabled;
        self
    }

    /// Number of status updates applied since creation.
    pub fn write_count(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn fetch(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(&id).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.values().cloned().collect())
    }

    async fn fetch_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .values()
            .filter(|invoice| invoice.status == status)
            .cloned()
            .collect())
    }

    async fn create(&self, invoice: Invoice) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&invoice.id) {
            return Err(BillingError::InvoiceAlreadyExists(invoice.id));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound(id))?;
        invoice.set_status(status);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_status_if_unchanged(&self, snapshot: &Invoice, status: InvoiceStatus) -> Result<bool> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(&snapshot.id)
            .ok_or(BillingError::InvoiceNotFound(snapshot.id))?;
        if invoice.status != snapshot.status || invoice.updated_at != snapshot.updated_at {
            return Ok(false);
        }
        invoice.set_status(status);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_all(&self) -> Result<()> {
        self.invoices.write().await.clear();
        Ok(())
    }

    fn supports_concurrent_writes(&self) -> bool {
        self.concurrent_writes
    }
}
