//! Core types for lambdabridge
//!
//! This crate provides the error taxonomy and request-id generation shared
//! by the plugin crate and its test tooling.

pub mod error;
pub mod request_id;

pub use error::{BoxError, ErrorKind, RequestError};
pub use request_id::RequestId;
