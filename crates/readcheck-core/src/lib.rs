//! readcheck-core: Assessment state machine, adapters, and scoring.
//!
//! This crate defines the data model, the language-model provider trait,
//! the question generation and grading adapters, the grading aggregator,
//! and the state machine that ties one reading assessment together.

pub mod aggregator;
pub mod controller;
pub mod error;
pub mod generation;
pub mod grading;
pub mod model;
pub mod passages;
pub mod retry;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_support;
