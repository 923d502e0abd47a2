use crate::application::processor::PaymentProcessor;
use crate::config::EngineConfig;
use crate::domain::invoice::{Invoice, InvoiceId, InvoiceStatus, PaymentOutcome};
use crate::domain::ports::{InvoiceRepositoryRef, PaymentGatewayRef};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Runs one batch of payments for every invoice in a given status.
///
/// This is the seam the scheduler drives; tests substitute their own runner.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    async fn run_batch(&self, target: InvoiceStatus) -> Result<BatchReport>;
}

/// An invoice whose processing failed with an error that has no status mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub invoice_id: InvoiceId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub target: InvoiceStatus,
    /// Outcomes in the order the invoices were fetched.
    pub outcomes: Vec<PaymentOutcome>,
    /// Invoices left out of `outcomes` because their processing failed.
    pub failures: Vec<BatchFailure>,
    /// Invoices another batch claimed between fetch and processing.
    pub skipped: Vec<InvoiceId>,
}

impl BatchReport {
    pub fn empty(target: InvoiceStatus) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn count(&self, status: InvoiceStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Fans a batch of invoices out to the payment processor and fans the results
/// back in.
///
/// Charges run concurrently up to `max_concurrency`; status writes go through
/// the processor's write gate.
pub struct BatchCoordinator {
    repository: InvoiceRepositoryRef,
    processor: Arc<PaymentProcessor>,
    max_concurrency: usize,
    stale_paying_after: Duration,
}

impl BatchCoordinator {
    /// Creates a coordinator with its own `PaymentProcessor`.
    ///
    /// # Arguments
    ///
    /// * `repository` - The store batches are fetched from and written to.
    /// * `gateway` - The gateway every charge goes through.
    /// * `config` - Concurrency bound, charge timeout and stale-`PAYING` threshold.
    pub fn new(
        repository: InvoiceRepositoryRef,
        gateway: PaymentGatewayRef,
        config: &EngineConfig,
    ) -> Self {
        let processor = PaymentProcessor::new(repository.clone(), gateway)
            .with_charge_timeout(config.charge_timeout);
        Self::with_processor(repository, Arc::new(processor), config)
    }

    /// Creates a coordinator around an existing processor, which keeps its own
    /// charge timeout; only the batch settings of `config` are used.
    pub fn with_processor(
        repository: InvoiceRepositoryRef,
        processor: Arc<PaymentProcessor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            processor,
            max_concurrency: config.max_concurrency.max(1),
            stale_paying_after: config.stale_paying_after,
        }
    }

    // PAYING invoices may still have a charge in flight; only stale ones are retried.
    async fn select(&self, target: InvoiceStatus) -> Result<Vec<Invoice>> {
        let invoices = self.repository.fetch_by_status(target).await?;
        if target != InvoiceStatus::Paying {
            return Ok(invoices);
        }

        let cutoff = TimeDelta::from_std(self.stale_paying_after)
            .ok()
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold));
        let Some(cutoff) = cutoff else {
            return Ok(Vec::new());
        };

        let total = invoices.len();
        let stale: Vec<Invoice> = invoices
            .into_iter()
            .filter(|invoice| invoice.updated_at <= cutoff)
            .collect();
        debug!(total, stale = stale.len(), "selected stale PAYING invoices");
        Ok(stale)
    }
}

#[async_trait]
impl BatchRunner for BatchCoordinator {
    async fn run_batch(&self, target: InvoiceStatus) -> Result<BatchReport> {
        let invoices = self.select(target).await?;
        if invoices.is_empty() {
            debug!(%target, "no invoices to process");
            return Ok(BatchReport::empty(target));
        }

        info!(%target, count = invoices.len(), "starting payment batch");

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let ids: Vec<InvoiceId> = invoices.iter().map(|invoice| invoice.id).collect();
        let mut tasks = JoinSet::new();

        for (index, invoice) in invoices.into_iter().enumerate() {
            let processor = self.processor.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, invoice.id, processor.process(&invoice).await)
            });
        }

        let mut slots: Vec<Option<PaymentOutcome>> = vec![None; ids.len()];
        let mut settled = vec![false; ids.len()];
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, invoice_id, result)) => {
                    settled[index] = true;
                    match result {
                        Ok(Some(outcome)) => slots[index] = Some(outcome),
                        Ok(None) => skipped.push(invoice_id),
                        Err(err) => {
                            error!(invoice = invoice_id, error = %err, "invoice payment failed");
                            failures.push(BatchFailure {
                                invoice_id,
                                error: err.to_string(),
                            });
                        }
                    }
                }
                Err(err) => error!(error = %err, "payment task aborted"),
            }
        }

        // A task that panicked reported neither an outcome nor an error.
        for (index, invoice_id) in ids.iter().enumerate() {
            if !settled[index] {
                failures.push(BatchFailure {
                    invoice_id: *invoice_id,
                    error: "payment task panicked".to_string(),
                });
            }
        }
        failures.sort_by_key(|failure| failure.invoice_id);
        skipped.sort_unstable();

        let report = BatchReport {
            target,
            outcomes: slots.into_iter().flatten().collect(),
            failures,
            skipped,
        };

        info!(
            %target,
            paid = report.count(InvoiceStatus::Paid),
            failed = report.outcomes.iter().filter(|o| o.status.is_failure()).count(),
            unclassified = report.failures.len(),
            skipped = report.skipped.len(),
            "payment batch finished"
        );
        Ok(report)
    }
}
