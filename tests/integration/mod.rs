//! Integration tests for cdx-export.

pub mod athena_test;
pub mod common;
pub mod pipeline_test;
pub mod poller_test;
pub mod schema_test;
