//! Autonomous execution engine.
//!
//! Polls signal providers on a timer, reconciles their recommendations into
//! a single admitted candidate, sizes it, and submits at most one order per
//! scan. Engine settings and the execution ledger live in a durable
//! Configuration Store; a trading-environment switch always disarms.

pub mod api;
pub mod clients;
pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod logging;
pub mod store;
pub mod types;
