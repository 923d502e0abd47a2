use crate::domain::customer::Customer;
use crate::domain::invoice::{Currency, CustomerId, Invoice, InvoiceId, InvoiceStatus, Money};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of an invoice seed file: `id,customer,amount,currency,status`.
///
/// `status` may be left empty, in which case the invoice starts `PENDING`.
#[derive(Debug, Deserialize)]
struct InvoiceRecord {
    id: InvoiceId,
    customer: CustomerId,
    amount: Decimal,
    currency: Currency,
    status: Option<InvoiceStatus>,
}

impl InvoiceRecord {
    fn into_invoice(self) -> Result<Invoice> {
        if self.amount.is_sign_negative() {
            return Err(BillingError::Validation(format!(
                "invoice {} has a negative amount",
                self.id
            )));
        }
        Ok(Invoice::new(
            self.id,
            self.customer,
            Money::new(self.amount, self.currency),
            self.status.unwrap_or_default(),
        ))
    }
}

fn builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.trim(csv::Trim::All).flexible(true);
    builder
}

/// Reads invoices from a CSV source.
///
/// Wraps `csv::Reader`, trims whitespace and tolerates a missing trailing
/// `status` column.
pub struct InvoiceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> InvoiceReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: builder().from_reader(source),
        }
    }

    /// Lazily reads and validates invoices, one `Result` per row.
    pub fn invoices(self) -> impl Iterator<Item = Result<Invoice>> {
        self.reader
            .into_deserialize::<InvoiceRecord>()
            .map(|record| record.map_err(BillingError::from).and_then(InvoiceRecord::into_invoice))
    }
}

/// Reads the customer directory (`id,currency`) from a CSV source.
pub struct CustomerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CustomerReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: builder().from_reader(source),
        }
    }

    pub fn customers(self) -> impl Iterator<Item = Result<Customer>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
