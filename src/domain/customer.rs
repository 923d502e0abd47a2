use super::invoice::{Currency, CustomerId};
use serde::{Deserialize, Serialize};

/// A billed customer. Only its currency matters to billing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Customer {
    pub id: CustomerId,
    pub currency: Currency,
}

impl Customer {
    pub fn new(id: CustomerId, currency: Currency) -> Self {
        Self { id, currency }
    }

    /// Whether an amount in `currency` can be charged to this customer.
    pub fn accepts(&self, currency: Currency) -> bool {
        self.currency == currency
    }
}
