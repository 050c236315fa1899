//! Liquidity manager for a Lightning Network hub node.
//!
//! The crate keeps channels to important counterparties funded in
//! proportion to observed payment flow, reports fee spending and fund
//! lock-up against USD guardrails, and maintains an append-only binary log
//! of topology updates that external tooling can tail or replay.

pub mod channel;
pub mod client;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod payment;
pub mod price;
pub mod stats;
pub mod wirelog;
