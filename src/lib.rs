//! AUGUR: multi-model consensus agent for Polymarket.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod platforms;
pub mod llm;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod dashboard;
