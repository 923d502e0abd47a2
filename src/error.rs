use crate::domain::invoice::{CustomerId, InvoiceId, InvoiceStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invoice {0} not found")]
    InvoiceNotFound(InvoiceId),
    #[error("Invoice {0} already exists")]
    InvoiceAlreadyExists(InvoiceId),
    #[error("Unsupported cadence unit: {0}")]
    UnsupportedCadence(String),
    #[error("Cadence target out of calendar range")]
    CadenceOutOfRange,
    #[error("Scheduler slot is already armed or running")]
    SlotOccupied,
    #[error("Unclassified gateway failure: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised by a payment gateway's `charge` call.
///
/// Every variant except `Unclassified` maps to a terminal invoice status and is
/// recovered by the payment processor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("currency mismatch for invoice {invoice}")]
    CurrencyMismatch { invoice: InvoiceId },
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error("{0}")]
    Unclassified(String),
}

impl GatewayError {
    /// Terminal invoice status for a classified failure, `None` otherwise.
    pub fn terminal_status(&self) -> Option<InvoiceStatus> {
        match self {
            GatewayError::Network(_) => Some(InvoiceStatus::FailedNetwork),
            GatewayError::CurrencyMismatch { .. } => Some(InvoiceStatus::FailedCurrencyMismatch),
            GatewayError::CustomerNotFound(_) => Some(InvoiceStatus::FailedCustomerNotFound),
            GatewayError::Unclassified(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
