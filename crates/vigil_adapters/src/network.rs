//! Shared HTTP client configuration for the Steam-facing adapters.
//!
//! Provides factory functions for creating properly configured HTTP clients
//! with appropriate timeouts, user agents, and settings for each endpoint
//! family.

use reqwest::Client;
use vigil_core::config::NetworkSettings;
use vigil_core::Error;

/// Base URL of the community endpoints (confirmations).
pub const COMMUNITY_BASE_URL: &str = "https://steamcommunity.com";

/// Base URL of the web API endpoints (time, authentication).
pub const API_BASE_URL: &str = "https://api.steampowered.com";

/// User agent the confirmation endpoints expect: the mobile app's browser
/// signature.
pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 6.0; Nexus 5) AppleWebKit/537.36";

/// User agent for the web API endpoints.
pub const API_USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

/// Build a configured HTTP client for the community (confirmation) endpoints.
///
/// This client is configured with:
/// - Cookie store disabled (session cookies are attached per request)
/// - The mobile user agent the confirmation pages expect
/// - Request and connect timeouts
pub fn build_community_client(network: &NetworkSettings) -> Result<Client, Error> {
    Client::builder()
        .cookie_store(false)
        .user_agent(MOBILE_USER_AGENT)
        .timeout(network.timeout())
        .connect_timeout(network.connect_timeout())
        .build()
        .map_err(|e| Error::RemoteUnavailable(format!("failed to create community HTTP client: {}", e)))
}

/// Build a configured HTTP client for the web API endpoints.
pub fn build_api_client(network: &NetworkSettings) -> Result<Client, Error> {
    Client::builder()
        .user_agent(API_USER_AGENT)
        .timeout(network.timeout())
        .connect_timeout(network.connect_timeout())
        .build()
        .map_err(|e| Error::RemoteUnavailable(format!("failed to create API HTTP client: {}", e)))
}
