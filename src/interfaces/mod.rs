//! Inbound adapters: the gateway redirect and webhook, and the CSV event log.

pub mod callback;
pub mod csv;
