//! arb-engine — multi-hop crypto arbitrage engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod market;
pub mod platforms;
pub mod llm;
pub mod strategy;
pub mod engine;
pub mod storage;
