//! Shared test utilities for levelcheck integration tests.
//!
//! - `TestHarness`: temp directories, a file-backed store, question files and
//!   an in-memory broker
//! - scripted transcription and scoring engines
//! - a one-shot HTTP responder for the engine clients

pub mod builders;
pub mod fake_http;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
