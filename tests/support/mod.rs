// Shared fixtures for the integration tests. Not every test binary
// exercises every helper.
#![allow(dead_code)]

pub mod task_store;
