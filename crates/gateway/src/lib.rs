//! HTTP client for the SMS dispatch service.
//!
//! Implements [`broadcast_core::dispatch::DispatchGateway`] on top of the
//! service's `send-single`, `send-batch`, and `verify-pin` endpoints.

pub mod client;
pub mod config;

pub use client::{GatewayError, HttpDispatchGateway};
pub use config::GatewayConfig;
