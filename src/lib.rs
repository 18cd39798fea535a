//! gherkinrs library
//!
//! Turns user stories into Gherkin scenarios with a local GGUF model.

pub mod api;
pub mod cli;
pub mod gateway;
pub mod inference;
pub mod prompt;
pub mod storage;
pub mod types;
