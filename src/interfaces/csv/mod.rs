//! CSV adapters: seed data in, payment outcomes out.

pub mod outcome_writer;
pub mod seed_reader;
