//! Integration tests for arb-engine.
//!
//! These run full decision cycles through the public engine API with a
//! deterministic in-memory exchange. No network access is required.

mod mock_exchange;
mod pipeline;
