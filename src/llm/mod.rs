//! Model gateway for the survey.
//!
//! The survey talks to an opaque text-completion endpoint through the
//! `LlmProvider` trait:
//! - **HttpEndpointProvider**: JSON chat body over HTTPS with bearer auth
//! - **ScriptedProvider**: queued replies, no network (tests and the
//!   `test-support` feature only)

pub mod http;
pub mod provider;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use http::{GatewayConfig, HttpEndpointProvider, extract_reply_text};
pub use provider::*;
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedProvider;

use std::sync::Arc;

use crate::error::ConfigError;

/// Create the HTTP-backed provider from configuration.
pub fn create_provider(config: GatewayConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    tracing::info!(
        endpoint = %config.endpoint_url,
        temperature = config.temperature,
        max_tokens = config.max_tokens,
        "Using serving endpoint"
    );
    Ok(Arc::new(HttpEndpointProvider::new(config)?))
}
