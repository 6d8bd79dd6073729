//! Integration tests for convoy-lib's HTTP surface and client.

mod client_tests;
mod common;
mod conditional_tests;
mod queue_tests;
