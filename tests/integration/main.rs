//! End-to-end tests driving `AccountRunner::tick` against a scripted
//! in-memory exchange.

mod mock_gateway;
mod scenarios;
