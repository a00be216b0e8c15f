//! cdx-export - deduplicated Common Crawl index exports through Athena.
//!
//! This library exposes the core modules for the binary and for
//! integration tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod logging;
pub mod query;
pub mod schema;
pub mod storage;
