use crate::domain::customer::Customer;
use crate::domain::invoice::{CustomerId, Invoice};
use crate::domain::ports::PaymentGateway;
use crate::error::GatewayError;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Outcome rates of a simulated gateway.
#[derive(Debug, Clone)]
pub struct GatewayProfile {
    /// Probability that a charge fails with a network error.
    pub network_failure_rate: f64,
    /// Probability that a charge which reaches the bank succeeds.
    pub success_rate: f64,
    /// Time every charge takes.
    pub latency: Duration,
}

impl Default for GatewayProfile {
    fn default() -> Self {
        Self {
            network_failure_rate: 0.05,
            success_rate: 0.9,
            latency: Duration::ZERO,
        }
    }
}

/// A payment gateway that settles charges from a seeded random source.
///
/// When a customer directory is supplied, unknown customers and invoices billed
/// in a currency the customer does not use fail before any money moves.
pub struct SimulatedGateway {
    customers: Option<HashMap<CustomerId, Customer>>,
    profile: GatewayProfile,
    rng: Mutex<StdRng>,
}

impl SimulatedGateway {
    pub fn new(profile: GatewayProfile, seed: u64) -> Self {
        Self {
            customers: None,
            profile,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn with_customers(mut self, customers: impl IntoIterator<Item = Customer>) -> Self {
        self.customers = Some(customers.into_iter().map(|c| (c.id, c)).collect());
        self
    }

    fn check_customer(&self, invoice: &Invoice) -> Result<(), GatewayError> {
        let Some(customers) = &self.customers else {
            return Ok(());
        };
        let customer = customers
            .get(&invoice.customer_id)
            .ok_or(GatewayError::CustomerNotFound(invoice.customer_id))?;
        if !customer.accepts(invoice.amount.currency) {
            return Err(GatewayError::CurrencyMismatch { invoice: invoice.id });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, invoice: &Invoice) -> Result<bool, GatewayError> {
        if !self.profile.latency.is_zero() {
            tokio::time::sleep(self.profile.latency).await;
        }

        self.check_customer(invoice)?;

        let mut rng = self.rng.lock().await;
        if rng.gen_bool(self.profile.network_failure_rate.clamp(0.0, 1.0)) {
            return Err(GatewayError::Network(format!(
                "connection reset while charging invoice {}",
                invoice.id
            )));
        }
        Ok(rng.gen_bool(self.profile.success_rate.clamp(0.0, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::invoice::{Currency, InvoiceStatus, Money};
    use rust_decimal_macros::dec;

    fn invoice(customer: CustomerId, currency: Currency) -> Invoice {
        Invoice::new(1, customer, Money::new(dec!(5.0), currency), InvoiceStatus::Pending)
    }

    fn certain(success_rate: f64, network_failure_rate: f64) -> GatewayProfile {
        GatewayProfile {
            network_failure_rate,
            success_rate,
            latency: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_certain_outcomes() {
        let paying = SimulatedGateway::new(certain(1.0, 0.0), 1);
        assert_eq!(paying.charge(&invoice(1, Currency::Eur)).await, Ok(true));

        let broke = SimulatedGateway::new(certain(0.0, 0.0), 1);
        assert_eq!(broke.charge(&invoice(1, Currency::Eur)).await, Ok(false));

        let offline = SimulatedGateway::new(certain(1.0, 1.0), 1);
        assert!(matches!(
            offline.charge(&invoice(1, Currency::Eur)).await,
            Err(GatewayError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_customer_directory_checks() {
        let gateway = SimulatedGateway::new(certain(1.0, 0.0), 7)
            .with_customers([Customer::new(1, Currency::Gbp)]);

        assert_eq!(gateway.charge(&invoice(1, Currency::Gbp)).await, Ok(true));
        assert_eq!(
            gateway.charge(&invoice(1, Currency::Eur)).await,
            Err(GatewayError::CurrencyMismatch { invoice: 1 })
        );
        assert_eq!(
            gateway.charge(&invoice(2, Currency::Gbp)).await,
            Err(GatewayError::CustomerNotFound(2))
        );
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let profile = GatewayProfile::default();
        let a = SimulatedGateway::new(profile.clone(), 42);
        let b = SimulatedGateway::new(profile, 42);

        for _ in 0..20 {
            let inv = invoice(1, Currency::Sek);
            assert_eq!(a.charge(&inv).await, b.charge(&inv).await);
        }
    }
}
