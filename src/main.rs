use billing_cycle::application::cadence::{self, CadenceUnit};
use billing_cycle::application::coordinator::BatchCoordinator;
use billing_cycle::application::scheduler::{RecurringScheduler, RunHandle, ScheduledRun};
use billing_cycle::config::EngineConfig;
use billing_cycle::domain::invoice::InvoiceStatus;
use billing_cycle::domain::ports::{InvoiceRepositoryRef, PaymentGatewayRef};
use billing_cycle::error::BillingError;
use billing_cycle::infrastructure::in_memory::InMemoryInvoiceRepository;
use billing_cycle::infrastructure::simulated_gateway::{GatewayProfile, SimulatedGateway};
use billing_cycle::interfaces::csv::outcome_writer::OutcomeWriter;
use billing_cycle::interfaces::csv::seed_reader::{CustomerReader, InvoiceReader};
use billing_cycle::telemetry;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Invoices CSV to seed the store with (`id,customer,amount,currency,status`)
    #[arg(long, env = "BILLING_INVOICES")]
    invoices: Option<PathBuf>,

    /// Customer directory CSV (`id,currency`). Without it every customer is accepted.
    #[arg(long, env = "BILLING_CUSTOMERS")]
    customers: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "BILLING_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Calendar unit of the billing cycle
    #[arg(long, env = "BILLING_UNIT", default_value = "months")]
    unit: CadenceUnit,

    /// Number of units between billing runs
    #[arg(long, env = "BILLING_EVERY", default_value_t = 1)]
    every: u32,

    /// Run a single PENDING batch after startup recovery, then exit
    #[arg(long, env = "BILLING_ONCE")]
    once: bool,

    #[arg(long, env = "BILLING_MAX_CONCURRENCY", default_value_t = 8)]
    max_concurrency: usize,

    /// Charges slower than this are recorded as network failures (0 disables)
    #[arg(long, env = "BILLING_CHARGE_TIMEOUT_MS", default_value_t = 30_000)]
    charge_timeout_ms: u64,

    /// PAYING invoices older than this are retried at startup
    #[arg(long, env = "BILLING_STALE_PAYING_AFTER_SECS", default_value_t = 900)]
    stale_paying_after_secs: u64,

    /// Probability that a charge reaching the bank succeeds
    #[arg(long, env = "BILLING_SUCCESS_RATE", default_value_t = 0.9)]
    success_rate: f64,

    /// Probability that a charge fails on the network
    #[arg(long, env = "BILLING_NETWORK_FAILURE_RATE", default_value_t = 0.05)]
    network_failure_rate: f64,

    #[arg(long, env = "BILLING_GATEWAY_LATENCY_MS", default_value_t = 0)]
    gateway_latency_ms: u64,

    /// Seed for the simulated gateway
    #[arg(long, env = "BILLING_SEED", default_value_t = 0)]
    seed: u64,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let timeout = (self.charge_timeout_ms > 0).then(|| Duration::from_millis(self.charge_timeout_ms));
        EngineConfig::default()
            .with_max_concurrency(self.max_concurrency)
            .with_charge_timeout(timeout)
            .with_stale_paying_after(Duration::from_secs(self.stale_paying_after_secs))
    }

    fn gateway_profile(&self) -> GatewayProfile {
        GatewayProfile {
            network_failure_rate: self.network_failure_rate,
            success_rate: self.success_rate,
            latency: Duration::from_millis(self.gateway_latency_ms),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_repository(db_path: Option<&PathBuf>) -> Result<InvoiceRepositoryRef> {
    use billing_cycle::infrastructure::rocksdb::RocksDbInvoiceRepository;

    match db_path {
        Some(path) => {
            let repository = RocksDbInvoiceRepository::open(path).into_diagnostic()?;
            Ok(Arc::new(repository))
        }
        None => Ok(Arc::new(InMemoryInvoiceRepository::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_repository(db_path: Option<&PathBuf>) -> Result<InvoiceRepositoryRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryInvoiceRepository::new()))
}

async fn seed_invoices(repository: &InvoiceRepositoryRef, path: &PathBuf) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut seeded = 0usize;
    for invoice in InvoiceReader::new(file).invoices() {
        match invoice {
            Ok(invoice) => match repository.create(invoice).await {
                Ok(_) => seeded += 1,
                Err(BillingError::InvoiceAlreadyExists(id)) => {
                    warn!(invoice = id, "invoice already stored, keeping stored state")
                }
                Err(e) => return Err(e).into_diagnostic(),
            },
            Err(e) => warn!(error = %e, "skipping invoice row"),
        }
    }
    info!(seeded, "invoices loaded");
    Ok(())
}

fn build_gateway(cli: &Cli) -> Result<PaymentGatewayRef> {
    let gateway = SimulatedGateway::new(cli.gateway_profile(), cli.seed);
    let Some(path) = &cli.customers else {
        return Ok(Arc::new(gateway));
    };

    let file = File::open(path).into_diagnostic()?;
    let mut customers = Vec::new();
    for customer in CustomerReader::new(file).customers() {
        match customer {
            Ok(customer) => customers.push(customer),
            Err(e) => warn!(error = %e, "skipping customer row"),
        }
    }
    info!(customers = customers.len(), "customer directory loaded");
    Ok(Arc::new(gateway.with_customers(customers)))
}

/// Prints every report the run produces until the run is over.
async fn drain<W: Write>(handle: &mut RunHandle, writer: &mut OutcomeWriter<W>) -> Result<()> {
    while let Some(report) = handle.next_report().await {
        match report {
            Ok(report) => writer.write_outcomes(&report.outcomes).into_diagnostic()?,
            Err(e) => error!(error = %e, "batch failed"),
        }
    }
    Ok(())
}

async fn run_now<W: Write>(
    scheduler: &RecurringScheduler,
    target: InvoiceStatus,
    writer: &mut OutcomeWriter<W>,
) -> Result<()> {
    let mut handle = scheduler
        .schedule_batch(ScheduledRun::immediate(target))
        .await
        .into_diagnostic()?;
    drain(&mut handle, writer).await
}

/// Prints reports of the periodic run until `shutdown` resolves.
///
/// On shutdown the scheduler is stopped and a batch already running is
/// waited for, so its invoices do not stay `PAYING`.
async fn serve<W: Write>(
    scheduler: &RecurringScheduler,
    mut handle: RunHandle,
    writer: &mut OutcomeWriter<W>,
    shutdown: impl Future<Output = Result<()>>,
) -> Result<()> {
    let interrupted = tokio::select! {
        result = drain(&mut handle, writer) => {
            result?;
            false
        }
        signal = shutdown => {
            signal?;
            true
        }
    };

    if interrupted {
        info!("shutdown requested");
        scheduler.stop_all().await;
        drain(&mut handle, writer).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let repository = open_repository(cli.db_path.as_ref())?;
    if let Some(path) = &cli.invoices {
        seed_invoices(&repository, path).await?;
    }

    // Reject a bad cadence before any batch charges anyone.
    if !cli.once {
        cadence::delay_to_next(cli.unit, cli.every).into_diagnostic()?;
    }

    let gateway = build_gateway(&cli)?;
    let coordinator = BatchCoordinator::new(repository, gateway, &cli.engine_config());
    let scheduler = RecurringScheduler::new(Arc::new(coordinator));

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    // Recover from the previous process before the cycle starts.
    run_now(&scheduler, InvoiceStatus::FailedNetwork, &mut writer).await?;
    run_now(&scheduler, InvoiceStatus::Paying, &mut writer).await?;

    if cli.once {
        return run_now(&scheduler, InvoiceStatus::Pending, &mut writer).await;
    }

    let handle = scheduler
        .schedule_batch(ScheduledRun::every(cli.every, cli.unit))
        .await
        .into_diagnostic()?;

    let ctrl_c = async { tokio::signal::ctrl_c().await.into_diagnostic() };
    serve(&scheduler, handle, &mut writer, ctrl_c).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_cycle::application::scheduler::SchedulerState;
    use billing_cycle::domain::invoice::{Currency, Invoice, Money};
    use billing_cycle::domain::ports::InvoiceRepository;
    use rust_decimal_macros::dec;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_batch() {
        let repository = Arc::new(InMemoryInvoiceRepository::new());
        repository
            .create(Invoice::new(1, 1, Money::new(dec!(10), Currency::Eur), InvoiceStatus::Pending))
            .await
            .unwrap();
        let gateway = SimulatedGateway::new(
            GatewayProfile {
                network_failure_rate: 0.0,
                success_rate: 1.0,
                latency: Duration::from_millis(200),
            },
            1,
        );
        let coordinator = BatchCoordinator::new(repository.clone(), Arc::new(gateway), &EngineConfig::default());
        let scheduler = RecurringScheduler::new(Arc::new(coordinator));
        let handle = scheduler
            .schedule_batch(ScheduledRun::every(0, CadenceUnit::Seconds))
            .await
            .unwrap();

        // Fires while the first charge is still in flight.
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        };
        let mut writer = OutcomeWriter::new(Vec::new());
        serve(&scheduler, handle, &mut writer, shutdown).await.unwrap();

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(output.contains("1,PAID"), "unexpected output: {output}");
        let stored = repository.fetch(1).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }
}
