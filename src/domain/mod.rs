//! Billing domain: invoices, customers, and the ports the core talks through.

pub mod customer;
pub mod invoice;
pub mod ports;
