use crate::domain::invoice::PaymentOutcome;
use crate::error::Result;
use std::io::Write;

/// Writes payment outcomes as `invoice,status` CSV rows.
///
/// The header is written once, before the first row, no matter how many
/// batches are written through the same writer.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes `outcomes` and flushes, so each batch is visible as soon as it ends.
    pub fn write_outcomes<'a>(
        &mut self,
        outcomes: impl IntoIterator<Item = &'a PaymentOutcome>,
    ) -> Result<()> {
        for outcome in outcomes {
            self.writer.serialize(outcome)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| err.into_error().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::invoice::InvoiceStatus;

    #[test]
    fn test_writes_header_once_across_batches() {
        let mut writer = OutcomeWriter::new(Vec::new());
        writer
            .write_outcomes(&[PaymentOutcome::new(1, InvoiceStatus::Paid)])
            .unwrap();
        writer
            .write_outcomes(&[
                PaymentOutcome::new(2, InvoiceStatus::FailedCurrencyMismatch),
                PaymentOutcome::new(3, InvoiceStatus::FailedEmptyAccount),
            ])
            .unwrap();

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            output,
            "invoice,status\n1,PAID\n2,FAILED_CURRENCY_MISMATCH\n3,FAILED_EMPTY_ACCOUNT\n"
        );
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let mut writer = OutcomeWriter::new(Vec::new());
        writer.write_outcomes(std::iter::empty()).unwrap();

        assert!(writer.into_inner().unwrap().is_empty());
    }
}
