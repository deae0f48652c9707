//! HEDGELOCK: paired long/short martingale engine with reversible hedge locks.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod events;
pub mod exchange;
pub mod precision;
pub mod state;
pub mod storage;
pub mod strategy;
pub mod engine;
pub mod types;
