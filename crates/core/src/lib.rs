//! Core business logic for taskdesk.
//!
//! Services here own the task lifecycle: quotes and counter-offers,
//! assignments and work submission, invoicing, payment reconciliation,
//! review meetings and the emails each step sends.

pub mod input;
pub mod services;

pub use services::*;
