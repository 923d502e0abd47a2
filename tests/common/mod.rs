use billing_cycle::domain::invoice::{Currency, Invoice, InvoiceId, InvoiceStatus, Money};
use billing_cycle::domain::ports::InvoiceRepository;
use rust_decimal_macros::dec;
use std::io::Error;
use std::path::Path;

/// Writes an invoice seed file with `rows` invoices for customer 1, all in `status`.
pub fn generate_invoices_csv(path: &Path, rows: u32, status: InvoiceStatus) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["id", "customer", "amount", "currency", "status"])?;

    for id in 1..=rows {
        wtr.write_record([
            id.to_string().as_str(),
            "1",
            "10.00",
            "EUR",
            status.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Seeds `count` invoices in `status` with ids starting at 1.
pub async fn seed_invoices(
    repository: &dyn InvoiceRepository,
    count: u32,
    status: InvoiceStatus,
) -> Vec<InvoiceId> {
    let mut ids = Vec::new();
    for id in 1..=count {
        let amount = Money::new(dec!(10.00) + rust_decimal::Decimal::from(id), Currency::Eur);
        repository
            .create(Invoice::new(id, id % 5, amount, status))
            .await
            .expect("seeding invoice");
        ids.push(id);
    }
    ids
}
