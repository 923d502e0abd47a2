use crate::domain::invoice::{Invoice, InvoiceId, InvoiceStatus};
use crate::domain::ports::InvoiceRepository;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding invoices keyed by big-endian id.
pub const CF_INVOICES: &str = "invoices";

/// A persistent invoice repository backed by RocksDB.
///
/// Keys are big-endian ids, so iteration order matches id order. Values are
/// JSON-encoded `Invoice`s.
///
/// `Clone` shares the underlying `Arc<DB>`. Status updates are read-modify-write
/// and therefore expect a single writer.
#[derive(Clone)]
pub struct RocksDbInvoiceRepository {
    db: Arc<DB>,
}

impl RocksDbInvoiceRepository {
    /// Opens or creates a RocksDB instance at `path`, creating the invoices column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_invoices = ColumnFamilyDescriptor::new(CF_INVOICES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_invoices])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn invoices(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_INVOICES)
            .ok_or_else(|| BillingError::Storage("invoices column family not found".to_string()))
    }

    fn put(&self, invoice: &Invoice) -> Result<()> {
        let cf = self.invoices()?;
        let value = serde_json::to_vec(invoice)?;
        self.db.put_cf(cf, invoice.id.to_be_bytes(), value)?;
        Ok(())
    }

    fn scan(&self, mut keep: impl FnMut(&Invoice) -> bool) -> Result<Vec<Invoice>> {
        let cf = self.invoices()?;
        let mut invoices = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let invoice: Invoice = serde_json::from_slice(&value)?;
            if keep(&invoice) {
                invoices.push(invoice);
            }
        }
        Ok(invoices)
    }
}

#[async_trait]
impl InvoiceRepository for RocksDbInvoiceRepository {
    async fn fetch(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let cf = self.invoices()?;
        match self.db.get_pinned_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Invoice>> {
        self.scan(|_| true)
    }

    async fn fetch_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>> {
        self.scan(|invoice| invoice.status == status)
    }

    async fn create(&self, invoice: Invoice) -> Result<Invoice> {
        let cf = self.invoices()?;
        if self.db.get_pinned_cf(cf, invoice.id.to_be_bytes())?.is_some() {
            return Err(BillingError::InvoiceAlreadyExists(invoice.id));
        }
        self.put(&invoice)?;
        Ok(invoice)
    }

    async fn update_status(&self, id: InvoiceId, status: InvoiceStatus) -> Result<()> {
        let mut invoice = self
            .fetch(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))?;
        invoice.set_status(status);
        self.put(&invoice)
    }

    async fn delete_all(&self) -> Result<()> {
        let cf = self.invoices()?;
        let keys = self
            .db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| item.map(|(key, _)| key))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for key in keys {
            self.db.delete_cf(cf, key)?;
        }
        Ok(())
    }
}
