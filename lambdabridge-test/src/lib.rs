//! Test tooling for lambdabridge
//!
//! Provides an in-memory platform client with programmable results and
//! call counters, for exercising the registrar and pipeline without a
//! remote platform.

pub mod platform;

pub use platform::MockPlatform;
