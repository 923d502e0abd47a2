use crate::error::BillingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type InvoiceId = u32;
pub type CustomerId = u32;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Dkk,
    Sek,
    Gbp,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Dkk => "DKK",
            Currency::Sek => "SEK",
            Currency::Gbp => "GBP",
        };
        f.write_str(code)
    }
}

/// A monetary amount in a single currency.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Money {
    pub value: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }
}

/// Billing state of an invoice.
///
/// One payment attempt moves an invoice `Pending -> Paying -> {Paid | Failed*}`.
/// Nothing moves an invoice back to `Pending`; failed invoices are retried by
/// fetching them again under their failure status.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paying,
    Paid,
    FailedEmptyAccount,
    FailedNetwork,
    FailedCustomerNotFound,
    FailedCurrencyMismatch,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Paying,
        InvoiceStatus::Paid,
        InvoiceStatus::FailedEmptyAccount,
        InvoiceStatus::FailedNetwork,
        InvoiceStatus::FailedCustomerNotFound,
        InvoiceStatus::FailedCurrencyMismatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paying => "PAYING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::FailedEmptyAccount => "FAILED_EMPTY_ACCOUNT",
            InvoiceStatus::FailedNetwork => "FAILED_NETWORK",
            InvoiceStatus::FailedCustomerNotFound => "FAILED_CUSTOMER_NOT_FOUND",
            InvoiceStatus::FailedCurrencyMismatch => "FAILED_CURRENCY_MISMATCH",
        }
    }

    /// Whether the status closes a payment attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceStatus::Pending | InvoiceStatus::Paying)
    }

    pub fn is_failure(&self) -> bool {
        self.is_terminal() && *self != InvoiceStatus::Paid
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| BillingError::Validation(format!("unknown invoice status '{}'", s)))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub status: InvoiceStatus,
    /// Time of the last status write.
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(id: InvoiceId, customer_id: CustomerId, amount: Money, status: InvoiceStatus) -> Self {
        Self {
            id,
            customer_id,
            amount,
            status,
            updated_at: Utc::now(),
        }
    }

    pub fn set_status(&mut self, status: InvoiceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// The result of one payment attempt: which invoice, and where it ended up.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct PaymentOutcome {
    #[serde(rename = "invoice")]
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
}

impl PaymentOutcome {
    pub fn new(invoice_id: InvoiceId, status: InvoiceStatus) -> Self {
        Self { invoice_id, status }
    }
}
