use super::invoice::{Invoice, InvoiceId, InvoiceStatus};
use crate::error::{BillingError, GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn fetch(&self, id: InvoiceId) -> Result<Option<Invoice>>;
    async fn fetch_all(&self) -> Result<Vec<Invoice>>;
    /// Invoices currently in `status`, ordered by id.
    async fn fetch_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>>;
    /// Fails with `BillingError::InvoiceAlreadyExists` when the id is taken.
    async fn create(&self, invoice: Invoice) -> Result<Invoice>;
    /// Fails with `BillingError::InvoiceNotFound` when `id` is absent.
    async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<()>;

    /// Writes `status` only if the stored invoice still has the status and
    /// `updated_at` of `snapshot`. Returns whether the write happened.
    ///
    /// The default reads then writes; callers serialize it for single-writer
    /// stores. Concurrent-writer stores must override it atomically.
    async fn update_status_if_unchanged(&self, snapshot: &Invoice, status: InvoiceStatus) -> Result<bool> {
        let current = self
            .fetch(snapshot.id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(snapshot.id))?;
        if current.status != snapshot.status || current.updated_at != snapshot.updated_at {
            return Ok(false);
        }
        self.update_status(snapshot.id, status).await?;
        Ok(true)
    }

    async fn delete_all(&self) -> Result<()>;

    /// Whether status writes for different invoices may run concurrently.
    ///
    /// When `false`, callers must serialize writes through one writer.
    fn supports_concurrent_writes(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the invoice amount. `Ok(false)` means insufficient funds.
    async fn charge(&self, invoice: &Invoice) -> std::result::Result<bool, GatewayError>;
}

pub type InvoiceRepositoryRef = Arc<dyn InvoiceRepository>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
