use crate::domain::invoice::{Invoice, InvoiceId, InvoiceStatus, PaymentOutcome};
use crate::domain::ports::{InvoiceRepositoryRef, PaymentGatewayRef};
use crate::error::{GatewayError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Serializes repository writes for stores that are not safe for concurrent
/// writers. A disabled gate lets writes through unguarded.
#[derive(Clone, Default)]
pub struct WriteGate {
    lock: Option<Arc<Mutex<()>>>,
}

impl WriteGate {
    /// A gate that lets one write through at a time.
    pub fn serialized() -> Self {
        Self {
            lock: Some(Arc::new(Mutex::new(()))),
        }
    }

    /// A gate that never blocks, for stores with concurrent writers.
    pub fn disabled() -> Self {
        Self { lock: None }
    }

    /// Picks the gate a repository needs.
    pub fn for_repository(repository: &InvoiceRepositoryRef) -> Self {
        if repository.supports_concurrent_writes() {
            Self::disabled()
        } else {
            Self::serialized()
        }
    }

    pub fn is_serialized(&self) -> bool {
        self.lock.is_some()
    }

    async fn acquire(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

/// Drives a single invoice through one payment attempt.
///
/// Each call claims the invoice by writing `PAYING`, charges through the
/// gateway, and writes the terminal status the charge maps to. Classified
/// gateway failures are recovered here; anything else propagates and leaves the
/// invoice `PAYING`.
pub struct PaymentProcessor {
    repository: InvoiceRepositoryRef,
    gateway: PaymentGatewayRef,
    gate: WriteGate,
    charge_timeout: Option<Duration>,
}

impl PaymentProcessor {
    /// Creates a processor with no charge timeout.
    ///
    /// # Arguments
    ///
    /// * `repository` - The store invoice statuses are written to. Its
    ///   `supports_concurrent_writes` decides whether writes are serialized.
    /// * `gateway` - The gateway charges are sent through.
    pub fn new(repository: InvoiceRepositoryRef, gateway: PaymentGatewayRef) -> Self {
        let gate = WriteGate::for_repository(&repository);
        Self {
            repository,
            gateway,
            gate,
            charge_timeout: None,
        }
    }

    /// Sets how long a charge may take before it counts as a network failure.
    /// `None` waits for the gateway indefinitely.
    pub fn with_charge_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.charge_timeout = timeout;
        self
    }

    /// Runs one payment attempt for `invoice`, a snapshot read from the repository.
    ///
    /// Returns `Ok(None)` without charging when the stored invoice no longer
    /// matches the snapshot, i.e. another batch already claimed it.
    pub async fn process(&self, invoice: &Invoice) -> Result<Option<PaymentOutcome>> {
        if !self.claim(invoice).await? {
            debug!(invoice = invoice.id, status = %invoice.status, "invoice changed since fetch, skipping");
            return Ok(None);
        }

        let status = match self.charge(invoice).await {
            Ok(true) => InvoiceStatus::Paid,
            Ok(false) => InvoiceStatus::FailedEmptyAccount,
            Err(err) => match err.terminal_status() {
                Some(status) => {
                    debug!(invoice = invoice.id, error = %err, "charge failed");
                    status
                }
                None => return Err(err.into()),
            },
        };

        self.write_status(invoice.id, status).await?;
        Ok(Some(PaymentOutcome::new(invoice.id, status)))
    }

    // Check and PAYING write happen under one gate acquisition.
    async fn claim(&self, invoice: &Invoice) -> Result<bool> {
        let _guard = self.gate.acquire().await;
        self.repository
            .update_status_if_unchanged(invoice, InvoiceStatus::Paying)
            .await
    }

    async fn charge(&self, invoice: &Invoice) -> std::result::Result<bool, GatewayError> {
        let Some(limit) = self.charge_timeout else {
            return self.gateway.charge(invoice).await;
        };

        match tokio::time::timeout(limit, self.gateway.charge(invoice)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(invoice = invoice.id, timeout_ms = limit.as_millis() as u64, "charge timed out");
                Err(GatewayError::Network(format!(
                    "charge timed out after {}ms",
                    limit.as_millis()
                )))
            }
        }
    }

    async fn write_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<()> {
        let _guard = self.gate.acquire().await;
        self.repository.update_status(id, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::invoice::{Currency, Money};
    use crate::domain::ports::{InvoiceRepository, PaymentGateway};
    use crate::error::BillingError;
    use crate::infrastructure::in_memory::InMemoryInvoiceRepository;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedGateway(std::result::Result<bool, GatewayError>);

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn charge(&self, _invoice: &Invoice) -> std::result::Result<bool, GatewayError> {
            self.0.clone()
        }
    }

    struct SlowGateway;

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn charge(&self, _invoice: &Invoice) -> std::result::Result<bool, GatewayError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    async fn setup(
        gateway: impl PaymentGateway + 'static,
    ) -> (PaymentProcessor, Arc<InMemoryInvoiceRepository>, Invoice) {
        let repository = Arc::new(InMemoryInvoiceRepository::new());
        let invoice = repository
            .create(Invoice::new(
                1,
                10,
                Money::new(dec!(42.50), Currency::Eur),
                InvoiceStatus::Pending,
            ))
            .await
            .unwrap();
        let processor = PaymentProcessor::new(repository.clone(), Arc::new(gateway));
        (processor, repository, invoice)
    }

    async fn status_of(repository: &InMemoryInvoiceRepository, id: InvoiceId) -> InvoiceStatus {
        repository.fetch(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_outcome_mapping() {
        let cases = [
            (Ok(true), InvoiceStatus::Paid),
            (Ok(false), InvoiceStatus::FailedEmptyAccount),
            (
                Err(GatewayError::Network("reset".to_string())),
                InvoiceStatus::FailedNetwork,
            ),
            (
                Err(GatewayError::CurrencyMismatch { invoice: 1 }),
                InvoiceStatus::FailedCurrencyMismatch,
            ),
            (
                Err(GatewayError::CustomerNotFound(10)),
                InvoiceStatus::FailedCustomerNotFound,
            ),
        ];

        for (result, expected) in cases {
            let (processor, repository, invoice) = setup(FixedGateway(result)).await;
            let outcome = processor.process(&invoice).await.unwrap();
            assert_eq!(outcome, Some(PaymentOutcome::new(1, expected)));
            assert_eq!(status_of(&repository, 1).await, expected);
            assert_eq!(repository.write_count(), 2);
        }
    }

    #[tokio::test]
    async fn test_unclassified_error_leaves_invoice_paying() {
        let (processor, repository, invoice) =
            setup(FixedGateway(Err(GatewayError::Unclassified("teapot".to_string())))).await;

        let result = processor.process(&invoice).await;

        assert!(matches!(
            result,
            Err(BillingError::Gateway(GatewayError::Unclassified(_)))
        ));
        assert_eq!(status_of(&repository, 1).await, InvoiceStatus::Paying);
        assert_eq!(repository.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_skipped() {
        let (processor, repository, invoice) = setup(FixedGateway(Ok(true))).await;

        let first = processor.process(&invoice).await.unwrap();
        let second = processor.process(&invoice).await.unwrap();

        assert_eq!(first, Some(PaymentOutcome::new(1, InvoiceStatus::Paid)));
        assert_eq!(second, None);
        assert_eq!(repository.write_count(), 2);
        assert_eq!(status_of(&repository, 1).await, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_of_paid_invoice_is_processed() {
        let (processor, repository, invoice) = setup(FixedGateway(Ok(true))).await;
        processor.process(&invoice).await.unwrap();

        let current = repository.fetch(1).await.unwrap().unwrap();
        let again = processor.process(&current).await.unwrap();

        assert_eq!(again, Some(PaymentOutcome::new(1, InvoiceStatus::Paid)));
        assert_eq!(repository.write_count(), 4);
    }

    #[tokio::test]
    async fn test_missing_invoice_propagates_not_found() {
        let (processor, _repository, mut invoice) = setup(FixedGateway(Ok(true))).await;
        invoice.id = 999;

        let result = processor.process(&invoice).await;
        assert!(matches!(result, Err(BillingError::InvoiceNotFound(999))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_charge_timeout_maps_to_network_failure() {
        let (processor, repository, invoice) = setup(SlowGateway).await;
        let processor = processor.with_charge_timeout(Some(Duration::from_secs(5)));

        let outcome = processor.process(&invoice).await.unwrap().unwrap();

        assert_eq!(outcome.status, InvoiceStatus::FailedNetwork);
        assert_eq!(status_of(&repository, 1).await, InvoiceStatus::FailedNetwork);
    }

    #[test]
    fn test_gate_follows_repository_capability() {
        let repository: InvoiceRepositoryRef = Arc::new(InMemoryInvoiceRepository::new());
        assert!(WriteGate::for_repository(&repository).is_serialized());

        let concurrent: InvoiceRepositoryRef =
            Arc::new(InMemoryInvoiceRepository::new().with_concurrent_writes(true));
        assert!(!WriteGate::for_repository(&concurrent).is_serialized());
    }
}
