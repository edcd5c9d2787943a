//! Upstream API transport and resource operations.

mod client;
mod config;
mod resources;

pub use client::{API_KEY_HEADER, RequestBuilder, STORE_ID_HEADER, UpstreamClient, build_http_client, error_message};
pub use config::{UpstreamConfig, UpstreamConfigBuilder};
pub use resources::{ResourceApi, extract_items, unwrap_item, validate_resource_id};
